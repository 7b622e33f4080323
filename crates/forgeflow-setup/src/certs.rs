//! TLS certificate issuance
//!
//! Certificates come from certbot's nginx integration on the host itself.
//! Before any remote call the configured domain must already resolve to
//! the host; a mismatch aborts with the resolved addresses in the message
//! and no certificate-authority traffic at all.

use crate::error::{Result, SetupError};
use crate::ssh::{RemoteShell, shell_escape};
use crate::step::StepOutcome;
use async_trait::async_trait;
use std::net::IpAddr;

#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn resolve(&self, domain: &str) -> Result<Vec<IpAddr>>;
}

/// Resolver backed by the system's stub resolver.
pub struct SystemDnsResolver;

#[async_trait]
impl DnsResolver for SystemDnsResolver {
    async fn resolve(&self, domain: &str) -> Result<Vec<IpAddr>> {
        let addresses = tokio::net::lookup_host((domain, 443)).await.map_err(|e| {
            SetupError::DnsLookupFailed {
                domain: domain.to_string(),
                detail: e.to_string(),
            }
        })?;

        let mut ips: Vec<IpAddr> = addresses.map(|socket| socket.ip()).collect();
        ips.sort_unstable();
        ips.dedup();
        Ok(ips)
    }
}

/// One host's certificate order.
#[derive(Debug, Clone)]
pub struct CertRequest {
    pub domain: String,
    pub admin_email: String,
    /// Address the domain must resolve to.
    pub host_address: String,
}

pub async fn issue_certificate(
    shell: &dyn RemoteShell,
    resolver: &dyn DnsResolver,
    request: &CertRequest,
) -> Result<StepOutcome> {
    let expected: IpAddr =
        request
            .host_address
            .parse()
            .map_err(|_| SetupError::PreconditionUnmet {
                domain: request.domain.clone(),
                detail: format!(
                    "host address \"{}\" is not an IP address",
                    request.host_address
                ),
            })?;

    let resolved = match resolver.resolve(&request.domain).await {
        Ok(addresses) => addresses,
        Err(err) => {
            return Err(SetupError::PreconditionUnmet {
                domain: request.domain.clone(),
                detail: format!("domain does not resolve: {}", err),
            });
        }
    };

    if !resolved.contains(&expected) {
        let listed = resolved
            .iter()
            .map(|ip| ip.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(SetupError::PreconditionUnmet {
            domain: request.domain.clone(),
            detail: format!("resolves to [{}] but the host is {}", listed, expected),
        });
    }

    let command = certbot_command(&request.domain, &request.admin_email);
    let output = shell.run(&command).await?;
    if !output.success() {
        return Err(SetupError::StepFailed {
            host: shell.target().to_string(),
            step: "certbot".to_string(),
            detail: output.stderr.trim().to_string(),
        });
    }

    let transcript = format!("{}\n{}", output.stdout, output.stderr);
    if transcript.contains("not yet due for renewal") {
        Ok(StepOutcome::Unchanged(format!(
            "{} certificate still valid",
            request.domain
        )))
    } else {
        Ok(StepOutcome::Changed(format!(
            "{} certificate issued",
            request.domain
        )))
    }
}

fn certbot_command(domain: &str, email: &str) -> String {
    format!(
        "sudo certbot --nginx --non-interactive --agree-tos --keep-until-expiring -m {} -d {}",
        shell_escape(email),
        shell_escape(domain)
    )
}
