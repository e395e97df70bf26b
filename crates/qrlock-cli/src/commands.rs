//! CLI command implementations

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use qrlock_daemon::service::decode_data_uri;
use qrlock_qr::QrEncoder;

use crate::client::{ClientError, LocalLocker, Locker, LockerClient};

/// QR Locker - seal short messages into password-protected QR codes
#[derive(Parser)]
#[command(name = "qrlock")]
#[command(about = "Seal short messages into password-protected QR codes")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to daemon socket
    #[arg(long, global = true)]
    pub socket: Option<PathBuf>,

    /// Session token from a previous call
    #[arg(long, global = true, env = "QRLOCK_SESSION")]
    pub session: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that the daemon is running
    Ping,

    /// Encrypt a message into a QR code
    Encrypt {
        /// Message to encrypt (at most 500 characters)
        #[arg(short, long)]
        message: String,

        /// Password (at least 6 characters)
        #[arg(short, long, env = "QRLOCK_PASSWORD", hide_env_values = true)]
        password: String,

        /// Write the QR code PNG here instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Run without a daemon
        #[arg(long)]
        local: bool,
    },

    /// Decrypt a QR image or a saved bundle
    Decrypt {
        #[arg(short, long, env = "QRLOCK_PASSWORD", hide_env_values = true)]
        password: String,

        /// QR code image file
        #[arg(long, conflicts_with = "bundle", required_unless_present = "bundle")]
        image: Option<PathBuf>,

        /// JSON file holding the encrypted bundle
        #[arg(long)]
        bundle: Option<PathBuf>,

        /// Run without a daemon
        #[arg(long)]
        local: bool,
    },

    /// Show what the daemon holds for this session
    Status,

    /// Drop this session's data
    Clear,
}

/// Run the CLI
pub async fn run(cli: Cli) -> Result<(), ClientError> {
    let client = match cli.socket {
        Some(path) => LockerClient::with_socket_path(path),
        None => LockerClient::new(),
    };
    let session = cli.session.as_deref();

    match cli.command {
        Commands::Ping => match client.ping().await {
            Ok(version) => println!("QR Locker daemon v{} is running", version),
            Err(ClientError::DaemonNotRunning) => {
                println!("QR Locker daemon is not running");
                println!("Start it with: qrlockd");
                return Err(ClientError::DaemonNotRunning);
            }
            Err(e) => return Err(e),
        },

        Commands::Encrypt {
            message,
            password,
            output,
            local,
        } => {
            let sealed = if local {
                LocalLocker::with_defaults()
                    .encrypt(session, &message, &password)
                    .await?
            } else {
                client.encrypt(session, &message, &password).await?
            };

            let encrypted = sealed.value;
            match output {
                Some(path) => {
                    let png = decode_data_uri(&encrypted.qr_code)
                        .ok_or(ClientError::UnexpectedResponse)?;
                    std::fs::write(&path, png)?;
                    println!("✓ QR code written to {}", path.display());
                }
                None => {
                    let transport = encrypted
                        .encrypted_data
                        .to_transport()
                        .map_err(|e| ClientError::DaemonError(e.to_string()))?;
                    let art = QrEncoder::to_unicode(&transport)
                        .map_err(|e| ClientError::DaemonError(e.to_string()))?;
                    println!("{}", art);
                }
            }
            println!("{}", serde_json::to_string_pretty(&encrypted.encrypted_data)?);
            println!("Stored for {}", encrypted.session_info.expires_in);
            print_session(sealed.token.as_deref());
        }

        Commands::Decrypt {
            password,
            image,
            bundle,
            local,
        } => {
            let locker: Box<dyn Locker> = if local {
                Box::new(LocalLocker::with_defaults())
            } else {
                Box::new(client)
            };

            let opened = match (image, bundle) {
                (Some(path), _) => {
                    let bytes = std::fs::read(&path)?;
                    locker.decrypt_image(session, &bytes, &password).await?
                }
                (None, Some(path)) => {
                    let text = std::fs::read_to_string(&path)?;
                    let value = serde_json::from_str::<Value>(&text)
                        .unwrap_or_else(|_| Value::String(text));
                    locker.decrypt_bundle(session, &value, &password).await?
                }
                (None, None) => return Err(ClientError::UnexpectedResponse),
            };

            println!("{}", opened.value.message);
            print_session(opened.token.as_deref());
        }

        Commands::Status => {
            let status = client.status(session).await?;
            let report = status.value;
            println!("Session: {}", report.session_id);
            match report.data_type {
                Some(kind) => println!("Holding: {} data", kind.as_str()),
                None => println!("Holding: nothing"),
            }
            println!("Active sessions: {}", report.total_sessions);
            println!("Files pending deletion: {}", report.temp_files_scheduled);
            println!("Storage: {}", report.storage_type);
            print_session(status.token.as_deref());
        }

        Commands::Clear => {
            client.clear(session).await?;
            println!("Session cleared");
        }
    }

    Ok(())
}

/// The token goes to stderr so stdout stays pipeable
fn print_session(token: Option<&str>) {
    if let Some(token) = token {
        eprintln!("export QRLOCK_SESSION={}", token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_decrypt_needs_exactly_one_source() {
        assert!(Cli::try_parse_from(["qrlock", "decrypt", "-p", "secret1"]).is_err());
        assert!(Cli::try_parse_from([
            "qrlock", "decrypt", "-p", "secret1", "--image", "a.png", "--bundle", "b.json"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["qrlock", "decrypt", "-p", "secret1", "--image", "a.png"]).is_ok());
    }

    #[test]
    fn test_global_session_flag() {
        let cli = Cli::try_parse_from(["qrlock", "status", "--session", "abc"]).unwrap();
        assert_eq!(cli.session.as_deref(), Some("abc"));
    }
}
