use async_trait::async_trait;

use tlsfabric_core::Result;

use super::{KeyStoreRequest, KeystoreTool, TrustStoreRequest};
use crate::pipeline::{diagnostics, ExternalCommand, PipelineRunner};

/// Variable every store password is read from (`-storepass:env ...`).
const STOREPASS_ENV: &str = "TLSFABRIC_STOREPASS";

/// Java `keytool`. Stores are written as JKS regardless of the JDK default.
#[derive(Debug, Clone)]
pub struct KeytoolKeystore {
    runner: PipelineRunner,
    keytool: String,
}

impl KeytoolKeystore {
    pub fn new(runner: PipelineRunner, keytool: impl Into<String>) -> Self {
        Self {
            runner,
            keytool: keytool.into(),
        }
    }

    fn trust_command(&self, request: &TrustStoreRequest<'_>) -> ExternalCommand {
        ExternalCommand::new(&self.keytool)
            .args(["-importcert", "-noprompt", "-file"])
            .arg(request.ca_cert)
            .args(["-alias", request.alias, "-keystore"])
            .arg(request.out)
            .args(["-storetype", "JKS", "-storepass:env", STOREPASS_ENV])
            .env(STOREPASS_ENV, request.password.expose())
    }

    fn keystore_command(&self, request: &KeyStoreRequest<'_>) -> ExternalCommand {
        ExternalCommand::new(&self.keytool)
            .args(["-importkeystore", "-noprompt", "-srckeystore"])
            .arg(request.pkcs12)
            .args([
                "-srcstoretype",
                "PKCS12",
                "-srcalias",
                request.src_alias,
                "-srcstorepass:env",
                STOREPASS_ENV,
                "-destkeystore",
            ])
            .arg(request.out)
            .args([
                "-deststoretype",
                "JKS",
                "-destalias",
                request.dest_alias,
                "-deststorepass:env",
                STOREPASS_ENV,
                "-destkeypass:env",
                STOREPASS_ENV,
            ])
            .env(STOREPASS_ENV, request.password.expose())
    }
}

#[async_trait]
impl KeystoreTool for KeytoolKeystore {
    async fn import_trusted(&self, request: &TrustStoreRequest<'_>) -> Result<String> {
        let output = self.runner.run_one(&self.trust_command(request)).await?;
        Ok(diagnostics(&output))
    }

    async fn import_keystore(&self, request: &KeyStoreRequest<'_>) -> Result<String> {
        let output = self.runner.run_one(&self.keystore_command(request)).await?;
        Ok(diagnostics(&output))
    }
}
