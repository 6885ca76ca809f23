use async_trait::async_trait;
use std::path::Path;

use tlsfabric_core::Result;

use super::{CaRequest, LeafRequest, Signer};
use crate::pipeline::{ExternalCommand, PipelineRunner};

/// `cfssl gencert ... | cfssljson -bare <prefix>`
#[derive(Debug, Clone)]
pub struct CfsslSigner {
    runner: PipelineRunner,
    cfssl: String,
    cfssljson: String,
}

impl CfsslSigner {
    pub fn new(runner: PipelineRunner, cfssl: impl Into<String>, cfssljson: impl Into<String>) -> Self {
        Self {
            runner,
            cfssl: cfssl.into(),
            cfssljson: cfssljson.into(),
        }
    }

    fn ca_pipeline(&self, request: &CaRequest<'_>) -> [ExternalCommand; 2] {
        let gencert = ExternalCommand::new(&self.cfssl)
            .args(["gencert", "-initca"])
            .arg(request.csr);
        [gencert, self.split(request.out.as_path())]
    }

    fn leaf_pipeline(&self, request: &LeafRequest<'_>) -> [ExternalCommand; 2] {
        let gencert = ExternalCommand::new(&self.cfssl)
            .arg("gencert")
            .arg("-ca")
            .arg(request.ca_cert)
            .arg("-ca-key")
            .arg(request.ca_key)
            .arg("-config")
            .arg(request.policy)
            .arg(format!("-profile={}", request.profile))
            .arg(request.csr);
        [gencert, self.split(request.out.as_path())]
    }

    fn split(&self, out: &Path) -> ExternalCommand {
        ExternalCommand::new(&self.cfssljson).arg("-bare").arg(out)
    }
}

#[async_trait]
impl Signer for CfsslSigner {
    async fn issue_ca(&self, request: &CaRequest<'_>) -> Result<String> {
        let out = self.runner.run(&self.ca_pipeline(request)).await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    async fn issue_leaf(&self, request: &LeafRequest<'_>) -> Result<String> {
        let out = self.runner.run(&self.leaf_pipeline(request)).await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}
