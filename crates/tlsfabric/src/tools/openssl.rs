use async_trait::async_trait;

use tlsfabric_core::Result;

use super::{Converter, Pkcs12Request, Pkcs8Request};
use crate::pipeline::{diagnostics, ExternalCommand, PipelineRunner};

/// Variable the export password is passed through (`-passout env:...`).
const PASSOUT_ENV: &str = "TLSFABRIC_PKCS12_PASSOUT";

/// `openssl pkcs8` / `openssl pkcs12 -export`
#[derive(Debug, Clone)]
pub struct OpensslConverter {
    runner: PipelineRunner,
    openssl: String,
}

impl OpensslConverter {
    pub fn new(runner: PipelineRunner, openssl: impl Into<String>) -> Self {
        Self {
            runner,
            openssl: openssl.into(),
        }
    }

    fn pkcs8_command(&self, request: &Pkcs8Request<'_>) -> ExternalCommand {
        ExternalCommand::new(&self.openssl)
            .args(["pkcs8", "-topk8", "-in"])
            .arg(request.key)
            .arg("-out")
            .arg(request.out)
            .arg("-nocrypt")
    }

    fn pkcs12_command(&self, request: &Pkcs12Request<'_>) -> ExternalCommand {
        ExternalCommand::new(&self.openssl)
            .args(["pkcs12", "-export", "-inkey"])
            .arg(request.key)
            .arg("-in")
            .arg(request.cert)
            .arg("-certfile")
            .arg(request.ca_cert)
            .arg("-out")
            .arg(request.out)
            .arg("-passout")
            .arg(format!("env:{PASSOUT_ENV}"))
            .env(PASSOUT_ENV, request.password.expose())
    }
}

#[async_trait]
impl Converter for OpensslConverter {
    async fn pkcs8(&self, request: &Pkcs8Request<'_>) -> Result<String> {
        let output = self.runner.run_one(&self.pkcs8_command(request)).await?;
        Ok(diagnostics(&output))
    }

    async fn pkcs12(&self, request: &Pkcs12Request<'_>) -> Result<String> {
        let output = self.runner.run_one(&self.pkcs12_command(request)).await?;
        Ok(diagnostics(&output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::path::Path;
    use std::time::Duration;
    use tlsfabric_core::KeystorePassword;

    fn converter() -> OpensslConverter {
        OpensslConverter::new(PipelineRunner::new(Duration::from_secs(5)), "openssl")
    }

    #[test]
    fn test_pkcs8_is_unencrypted() {
        let command = converter().pkcs8_command(&Pkcs8Request {
            key: Path::new("/certs/node-key.pem"),
            out: Path::new("/certs/node-key.pkcs8.pem"),
        });
        assert_eq!(
            command.to_string(),
            "openssl pkcs8 -topk8 -in /certs/node-key.pem -out /certs/node-key.pkcs8.pem -nocrypt"
        );
    }

    #[test]
    fn test_pkcs12_password_stays_out_of_argv() {
        let password = KeystorePassword::new("s3cret-pass");
        let command = converter().pkcs12_command(&Pkcs12Request {
            cert: Path::new("/certs/node.pem"),
            key: Path::new("/certs/node-key.pem"),
            ca_cert: Path::new("/certs/ca.pem"),
            out: Path::new("/certs/node.pkcs12"),
            password: &password,
        });

        let rendered = command.to_string();
        assert!(rendered.ends_with("-passout env:TLSFABRIC_PKCS12_PASSOUT"));
        assert!(!rendered.contains("s3cret-pass"));
        assert_eq!(
            command.get_envs().collect::<Vec<_>>(),
            vec![(OsStr::new("TLSFABRIC_PKCS12_PASSOUT"), OsStr::new("s3cret-pass"))]
        );
    }
}
