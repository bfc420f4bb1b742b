//! Command parsing and execution.
//!
//! `App` owns the one `Session` for the process and the `Router` that
//! guards page transitions; every command goes through them.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use authgate_core::utils::truncate_string;
use authgate_core::{
    ApiClient, Captcha, Config, LoginRequest, NavigationGuard, RegisterRequest, Router, Session,
    SessionStatus,
};

/// Characters of the captcha payload echoed to the terminal
const CAPTCHA_PREVIEW_LEN: usize = 80;

/// Prompt shown by the interactive shell
const SHELL_PROMPT: &str = "authgate> ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { remember: bool },
    Register { remember: bool },
    Logout,
    Whoami,
    Open(String),
    Get(String),
    Status,
    Shell,
    Quit,
}

impl Command {
    /// Parse command-line words. `Ok(None)` means help was requested or no
    /// command was given.
    pub fn parse(args: &[String]) -> Result<Option<Self>> {
        let Some((name, rest)) = args.split_first() else {
            return Ok(None);
        };
        let remember = rest.iter().any(|a| a == "--remember" || a == "-r");
        let path = || {
            rest.first()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("`{}` needs a path", name))
        };

        let command = match name.as_str() {
            "login" => Command::Login { remember },
            "register" => Command::Register { remember },
            "logout" => Command::Logout,
            "whoami" => Command::Whoami,
            "open" => Command::Open(path()?),
            "get" => Command::Get(path()?),
            "status" => Command::Status,
            "shell" => Command::Shell,
            "quit" | "exit" => Command::Quit,
            "help" | "--help" | "-h" => return Ok(None),
            other => return Err(anyhow::anyhow!("Unknown command: {}", other)),
        };
        Ok(Some(command))
    }
}

pub struct App {
    pub config: Config,
    pub session: Session,
    pub router: Router,
    in_shell: bool,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        debug!(?config, "Config loaded");

        let api = ApiClient::new(&config.base_url, config.request_timeout())?;
        let store = config.credential_store()?;
        let session = Session::with_verify_timeout(store, Arc::new(api), config.verify_timeout());
        let router = Router::new(NavigationGuard::new(config.guard_policy()));

        Ok(Self {
            config,
            session,
            router,
            in_shell: false,
        })
    }

    pub async fn run(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Login { remember } => self.login(remember).await,
            Command::Register { remember } => self.register(remember).await,
            Command::Logout => {
                self.session.logout();
                println!("Logged out.");
                Ok(())
            }
            Command::Whoami => self.whoami().await,
            Command::Open(path) => self.open(&path).await,
            Command::Get(path) => self.get(&path).await,
            Command::Status => {
                self.print_status();
                Ok(())
            }
            Command::Shell => self.shell().await,
            Command::Quit => Ok(()),
        }
    }

    async fn login(&mut self, remember: bool) -> Result<()> {
        let captcha = self.session.captcha().await.map_err(|e| anyhow::anyhow!(e.user_message()))?;
        println!("{}", captcha_line(&captcha));

        let account = match std::env::var("AUTHGATE_ACCOUNT") {
            Ok(account) if !account.is_empty() => account,
            _ => Self::prompt_with_default("Account", self.config.last_account.as_deref())?,
        };
        let password = Self::password()?;
        let captcha_answer = Self::prompt("Captcha answer")?;

        let request = LoginRequest {
            account: account.clone(),
            password,
            captcha_id: captcha.captcha_id,
            captcha: captcha_answer,
        };
        self.session
            .login(&request, remember)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;

        self.config.last_account = Some(account);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        println!("Login successful!");
        self.warn_if_ephemeral(remember);
        self.open("/").await
    }

    async fn register(&mut self, remember: bool) -> Result<()> {
        let captcha = self.session.captcha().await.map_err(|e| anyhow::anyhow!(e.user_message()))?;
        println!("{}", captcha_line(&captcha));

        let username = Self::prompt("Username")?;
        let email = Self::prompt("Email")?;
        let password = Self::password()?;
        let captcha_answer = Self::prompt("Captcha answer")?;

        let request = RegisterRequest {
            username: username.clone(),
            email,
            password,
            captcha_id: captcha.captcha_id,
            captcha: captcha_answer,
        };
        self.session
            .register(&request, remember)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;

        self.config.last_account = Some(username);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        println!("Account created.");
        self.warn_if_ephemeral(remember);
        self.open("/").await
    }

    async fn whoami(&self) -> Result<()> {
        if !self.session.is_logged_in() {
            println!("Not logged in.");
            return Ok(());
        }
        if !self.session.verify_once().await {
            println!("Session expired, please log in again.");
            return Ok(());
        }
        match self.session.user() {
            Some(user) => println!("{} <{}> (id {})", user.display_name(), user.email, user.id),
            None => println!("Not logged in."),
        }
        Ok(())
    }

    async fn open(&mut self, path: &str) -> Result<()> {
        let page = self.router.navigate(path, &self.session).await?;
        if page == path {
            println!("Opened {}", page);
        } else {
            println!("Opened {} (redirected from {})", page, path);
        }
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<()> {
        let body = self
            .session
            .fetch(path)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        Ok(())
    }

    fn print_status(&self) {
        let snap = self.session.snapshot();
        let state = match snap.status {
            SessionStatus::Anonymous => "anonymous",
            SessionStatus::Unverified => "token present, not verified",
            SessionStatus::Verified => "verified",
        };
        println!("Session: {}", state);
        if let Some(user) = snap.user {
            println!("User:    {}", user.display_name());
        }
        if let Some(at) = snap.verified_at {
            println!("Checked: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        if let Some(page) = self.router.current() {
            println!("Page:    {}", page);
        }
    }

    async fn shell(&mut self) -> Result<()> {
        self.in_shell = true;
        // First load goes through the guard like any other transition.
        self.open("/").await?;

        loop {
            print!("{}", SHELL_PROMPT);
            io::stdout().flush()?;

            let mut line = String::new();
            if io::stdin().read_line(&mut line)? == 0 {
                break;
            }
            let words: Vec<String> = line.split_whitespace().map(str::to_string).collect();

            let command = match Command::parse(&words) {
                Ok(Some(Command::Quit)) => break,
                Ok(Some(Command::Shell)) => continue,
                Ok(Some(command)) => command,
                Ok(None) => {
                    println!("Commands: login, register, logout, whoami, open, get, status, quit");
                    continue;
                }
                Err(e) => {
                    println!("{}", e);
                    continue;
                }
            };

            let logout = command == Command::Logout;
            if let Err(e) = Box::pin(self.run(command)).await {
                println!("Error: {:#}", e);
            }
            if logout {
                self.router.reload(&self.session).await?;
            }
        }
        Ok(())
    }

    fn warn_if_ephemeral(&self, remember: bool) {
        if !remember && !self.in_shell {
            println!("Token not remembered: it is discarded when this command exits.");
        }
    }

    // ===== Prompts =====

    fn prompt(label: &str) -> Result<String> {
        print!("{}: ", label);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input).context("Failed to read input")?;
        Ok(input.trim().to_string())
    }

    fn prompt_with_default(label: &str, default: Option<&str>) -> Result<String> {
        match default {
            Some(default) => {
                let input = Self::prompt(&format!("{} [{}]", label, default))?;
                Ok(if input.is_empty() { default.to_string() } else { input })
            }
            None => Self::prompt(label),
        }
    }

    fn password() -> Result<String> {
        match std::env::var("AUTHGATE_PASSWORD") {
            Ok(password) if !password.is_empty() => Ok(password),
            _ => rpassword::prompt_password("Password: ").context("Failed to read password"),
        }
    }
}

/// Terminal line describing a captcha challenge.
fn captcha_line(captcha: &Captcha) -> String {
    let image = truncate_string(&captcha.image, CAPTCHA_PREVIEW_LEN);
    match captcha.expires_in {
        Some(secs) => format!("Captcha: {} (valid for {}s)", image, secs),
        None => format!("Captcha: {}", image),
    }
}
