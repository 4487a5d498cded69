//! Static key resolution for the S3 client.
//!
//! Keys in the `s3` config section pin the client to one identity. Leaving
//! both out hands resolution to the AWS default chain, which the SDK walks
//! lazily on the first request.

use crate::config::S3Config;
use aws_credential_types::Credentials;
use thiserror::Error;

/// Provider name attached to keys taken from the config file
pub const CONFIG_PROVIDER_NAME: &str = "s3-loadgen-config";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CredentialsError {
    /// Only one half of the key pair was configured
    #[error("s3.{present} is set but s3.{missing} is not")]
    Unpaired {
        present: &'static str,
        missing: &'static str,
    },

    #[error("s3.{0} is blank")]
    Blank(&'static str),
}

/// Turns the `s3` config section into SDK credentials
pub struct CredentialsProvider;

impl CredentialsProvider {
    /// `Ok(None)` means "use the default provider chain".
    pub fn from_config(config: &S3Config) -> Result<Option<Credentials>, CredentialsError> {
        let (access, secret) = match (&config.access_key, &config.secret_key) {
            (None, None) => return Ok(None),
            (Some(_), None) => {
                return Err(CredentialsError::Unpaired {
                    present: "access_key",
                    missing: "secret_key",
                })
            }
            (None, Some(_)) => {
                return Err(CredentialsError::Unpaired {
                    present: "secret_key",
                    missing: "access_key",
                })
            }
            (Some(access), Some(secret)) => (access, secret),
        };

        if access.trim().is_empty() {
            return Err(CredentialsError::Blank("access_key"));
        }
        if secret.trim().is_empty() {
            return Err(CredentialsError::Blank("secret_key"));
        }

        Ok(Some(Credentials::new(
            access.clone(),
            secret.clone(),
            config.session_token.clone(),
            None,
            CONFIG_PROVIDER_NAME,
        )))
    }
}
