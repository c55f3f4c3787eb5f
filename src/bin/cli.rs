// LibriSync - Audible Library Sync for Mobile
// Copyright (C) 2025 Henning Berge
//
// This program is a Rust port of Libation (https://github.com/rmcrackan/Libation)
// Original work Copyright (C) Libation contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use reqwest::Method;
use tracing_subscriber::EnvFilter;
use url::Url;

use librisync_auth::api::challenge::{ApprovalWaiter, CaptchaSolver, ChallengeHandlers, CvfProvider, OtpProvider};
use librisync_auth::api::http::{HttpSession, ReqwestSession, SessionConfig};
use librisync_auth::api::identity::DeviceIdentity;
use librisync_auth::api::license::fetch_activation_bytes;
use librisync_auth::api::locale::Locale;
use librisync_auth::api::login::{LoginConfig, LoginOrchestrator};
use librisync_auth::api::registration::{register, RegistrationRequest};
use librisync_auth::api::signing::{path_and_query, Authenticator};
use librisync_auth::crypto::credential_cipher::{remove_file_encryption, CipherOptions, CredentialCipher, FileEncryption};

#[derive(Parser)]
#[command(name = "librisync-cli")]
#[command(about = "LibriSync CLI - Audible device authentication", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in, register a device and save its credentials
    Login {
        /// Marketplace country code (us, uk, de, ...)
        #[arg(short, long, default_value = "us")]
        locale: String,
        /// Email address or Audible username
        #[arg(short, long)]
        email: String,
        /// Password (prompted when omitted)
        #[arg(short, long)]
        password: Option<String>,
        /// Sign in with an Audible username (de, com, co.uk only)
        #[arg(long)]
        with_username: bool,
        /// Credential file to write
        #[arg(short, long, default_value = "credentials.json")]
        output: PathBuf,
        /// Encrypt the credential file with this password
        #[arg(long)]
        file_password: Option<String>,
        /// Encryption format: json or bytes
        #[arg(long, default_value = "json")]
        encryption: String,
    },
    /// Refresh the access token of a credential file
    Refresh {
        #[arg(short, long, default_value = "credentials.json")]
        file: PathBuf,
        #[arg(long)]
        file_password: Option<String>,
        #[arg(long)]
        with_username: bool,
        /// Refresh even if the token is still valid
        #[arg(long)]
        force: bool,
    },
    /// Print the authentication headers for a request
    Sign {
        #[arg(short, long, default_value = "credentials.json")]
        file: PathBuf,
        #[arg(long)]
        file_password: Option<String>,
        #[arg(short, long, default_value = "GET")]
        method: String,
        /// Full request URL
        url: String,
        /// Request body
        #[arg(short, long)]
        body: Option<String>,
    },
    /// Fetch and store the activation bytes
    ActivationBytes {
        #[arg(short, long, default_value = "credentials.json")]
        file: PathBuf,
        #[arg(long)]
        file_password: Option<String>,
    },
    /// Deregister the device
    Deregister {
        #[arg(short, long, default_value = "credentials.json")]
        file: PathBuf,
        #[arg(long)]
        file_password: Option<String>,
        #[arg(long)]
        with_username: bool,
        /// Deregister every device of the account
        #[arg(long)]
        all: bool,
    },
    /// Write a decrypted copy of an encrypted credential file
    DecryptFile {
        input: PathBuf,
        output: PathBuf,
        #[arg(short, long)]
        password: String,
    },
}

/// Challenge strategies answered on the terminal
struct TerminalPrompt;

async fn prompt(question: String) -> librisync_auth::Result<String> {
    let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
        print!("{}: ", question);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    })
    .await
    .map_err(|e| librisync_auth::AuthError::InternalError(format!("prompt task failed: {}", e)))??;
    Ok(answer)
}

#[async_trait]
impl CaptchaSolver for TerminalPrompt {
    async fn solve(&self, image_url: &Url) -> librisync_auth::Result<String> {
        println!("CAPTCHA required, open: {}", image_url);
        prompt("Characters shown".to_string()).await
    }
}

#[async_trait]
impl OtpProvider for TerminalPrompt {
    async fn one_time_code(&self, hint: Option<&str>) -> librisync_auth::Result<String> {
        if let Some(hint) = hint {
            println!("{}", hint);
        }
        prompt("One-time password".to_string()).await
    }
}

#[async_trait]
impl CvfProvider for TerminalPrompt {
    async fn verification_code(&self, method: Option<&str>) -> librisync_auth::Result<String> {
        println!("Verification code sent via {}", method.unwrap_or("the selected method"));
        prompt("Verification code".to_string()).await
    }
}

#[async_trait]
impl ApprovalWaiter for TerminalPrompt {
    async fn notify(&self, message: Option<&str>) -> librisync_auth::Result<()> {
        println!(
            "Approve the sign-in on your device. {}",
            message.unwrap_or("Waiting for approval...")
        );
        Ok(())
    }
}

fn cipher_for(password: Option<&str>) -> anyhow::Result<Option<CredentialCipher>> {
    password
        .map(|password| CredentialCipher::with_password(password))
        .transpose()
        .context("invalid credential file password")
}

fn load_identity(path: &Path, password: Option<&str>) -> anyhow::Result<(DeviceIdentity, Option<CredentialCipher>)> {
    let cipher = cipher_for(password)?;
    let identity = DeviceIdentity::from_file(path, cipher.as_ref())
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok((identity, cipher))
}

fn save_identity(path: &Path, identity: &DeviceIdentity, cipher: Option<&CredentialCipher>) -> anyhow::Result<()> {
    identity
        .update_file(path, cipher)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn new_session() -> anyhow::Result<Arc<dyn HttpSession>> {
    Ok(Arc::new(ReqwestSession::new(SessionConfig::default())?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Login {
            locale,
            email,
            password,
            with_username,
            output,
            file_password,
            encryption,
        } => {
            let locale = Locale::from_country_code(&locale)?;
            let password = match password {
                Some(password) => password,
                None => prompt("Password".to_string()).await?,
            };
            let config = LoginConfig::builder(locale.clone())
                .with_username(with_username)
                .build()?;
            let session: Arc<dyn HttpSession> = Arc::new(ReqwestSession::new(SessionConfig::for_device(&config.device))?);

            let terminal = Arc::new(TerminalPrompt);
            let handlers = ChallengeHandlers::new()
                .captcha(terminal.clone())
                .otp(terminal.clone())
                .cvf(terminal.clone())
                .approval(terminal);

            let login = LoginOrchestrator::new(session.clone(), config)
                .with_handlers(handlers)
                .login(&email, &password)
                .await
                .context("sign-in failed")?;
            let registration = register(
                session.as_ref(),
                &RegistrationRequest::from_login(&login, locale, with_username),
                chrono::Utc::now(),
            )
            .await
            .context("device registration failed")?;

            let cipher = cipher_for(file_password.as_deref())?;
            let encryption: FileEncryption = encryption.parse()?;
            registration
                .identity
                .to_file(&output, cipher.as_ref().map(|c| (c, encryption)))
                .with_context(|| format!("failed to write {}", output.display()))?;

            println!("Registered device {}", registration.identity.masked_log_entry());
            println!("Credentials saved to {}", output.display());
        }
        Commands::Refresh {
            file,
            file_password,
            with_username,
            force,
        } => {
            let (identity, cipher) = load_identity(&file, file_password.as_deref())?;
            let auth = Authenticator::new(new_session()?, identity).with_username(with_username);
            let identity = if force {
                auth.force_refresh().await?
            } else {
                auth.ensure_fresh_access_token().await?
            };
            save_identity(&file, &identity, cipher.as_ref())?;
            match identity.expires() {
                Some(expires) => println!("Access token valid until {}", expires.to_rfc3339()),
                None => println!("Identity has no access token"),
            }
        }
        Commands::Sign {
            file,
            file_password,
            method,
            url,
            body,
        } => {
            let (identity, _) = load_identity(&file, file_password.as_deref())?;
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes()).context("invalid HTTP method")?;
            let url = Url::parse(&url).context("invalid URL")?;
            let auth = Authenticator::new(new_session()?, identity);
            let headers = auth
                .auth_headers(&method, &url, body.as_deref().map(str::as_bytes))
                .await?;
            println!("{} {}", method, path_and_query(&url));
            for (name, value) in headers.iter() {
                println!("{}: {}", name, value);
            }
        }
        Commands::ActivationBytes { file, file_password } => {
            let (identity, cipher) = load_identity(&file, file_password.as_deref())?;
            let locale = identity.locale().clone();
            let auth = Authenticator::new(new_session()?, identity);
            let bytes = fetch_activation_bytes(&auth, &locale).await?;
            let identity = auth.set_activation_bytes(bytes).await?;
            save_identity(&file, &identity, cipher.as_ref())?;
            println!("Activation bytes: {}", bytes);
        }
        Commands::Deregister {
            file,
            file_password,
            with_username,
            all,
        } => {
            let (identity, _) = load_identity(&file, file_password.as_deref())?;
            let auth = Authenticator::new(new_session()?, identity).with_username(with_username);
            auth.deregister(all).await.context("deregistration failed")?;
            println!("Device deregistered; {} is no longer valid", file.display());
        }
        Commands::DecryptFile {
            input,
            output,
            password,
        } => {
            if input == output {
                bail!("input and output must differ");
            }
            remove_file_encryption(&input, &output, &password, CipherOptions::default())
                .with_context(|| format!("failed to decrypt {}", input.display()))?;
            println!("Decrypted {} to {}", input.display(), output.display());
        }
    }

    Ok(())
}
