//! etcd-tls - provision mTLS secrets for the etcd cluster behind a Vault cluster

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kube::Client;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zeroize::Zeroizing;

use etcd_tls::pki::{CertificateInfo, TrustRootProvider};
use etcd_tls::{
    ClusterDescriptor, CredentialBundle, InMemorySecretStore, KubeSecretStore, ProvisionerConfig,
    ProvisioningOrchestrator,
};

/// etcd-tls - CA and client/server/peer certificates for Vault's etcd
#[derive(Parser, Debug)]
#[command(name = "etcd-tls", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the CA and the client, server and peer TLS secrets
    ///
    /// Secrets are created, never replaced. Running against a namespace that
    /// already holds them fails on the first existing secret.
    Provision(ProvisionArgs),
}

/// Provision mode arguments
#[derive(Parser, Debug)]
struct ProvisionArgs {
    /// Name of the Vault cluster
    #[arg(long)]
    cluster: String,

    /// Namespace the Vault cluster runs in
    #[arg(long, env = "POD_NAMESPACE")]
    namespace: String,

    /// Cluster DNS domain (defaults to the configured domain)
    #[arg(long)]
    cluster_domain: Option<String>,

    /// Path to a provisioner config YAML file
    #[arg(short = 'f', long = "config")]
    config_file: Option<PathBuf>,

    /// PEM certificate of an existing CA to sign with
    #[arg(long, requires = "import_ca_key")]
    import_ca_cert: Option<PathBuf>,

    /// PEM private key of the imported CA
    #[arg(long, requires = "import_ca_cert")]
    import_ca_key: Option<PathBuf>,

    /// Build the secrets in memory and print a summary instead of writing them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Provision(args) => run_provision(args).await,
    }
}

async fn run_provision(args: ProvisionArgs) -> anyhow::Result<()> {
    let config = match &args.config_file {
        Some(path) => ProvisionerConfig::from_file(path)?,
        None => ProvisionerConfig::default(),
    };

    let mut cluster = ClusterDescriptor::new(&args.cluster, &args.namespace);
    if let Some(domain) = &args.cluster_domain {
        cluster = cluster.with_cluster_domain(domain);
    }

    let trust_root = load_trust_root(&args)?;

    if args.dry_run {
        let orchestrator = ProvisioningOrchestrator::new(config, InMemorySecretStore::new())?
            .with_trust_root(trust_root);
        let report = orchestrator.provision(&cluster).await?;

        for name in &report.secrets {
            if let Some(bundle) = orchestrator.store().get(name).await {
                print_summary(&bundle)?;
            }
        }
        return Ok(());
    }

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    let store = KubeSecretStore::new(client, &args.namespace);
    let orchestrator = ProvisioningOrchestrator::new(config, store)?.with_trust_root(trust_root);

    let report = orchestrator.provision(&cluster).await?;
    info!(
        cluster = %report.cluster,
        namespace = %report.namespace,
        secrets = ?report.secrets,
        "provisioning complete"
    );
    Ok(())
}

fn load_trust_root(args: &ProvisionArgs) -> anyhow::Result<TrustRootProvider> {
    let (Some(cert_path), Some(key_path)) = (&args.import_ca_cert, &args.import_ca_key) else {
        return Ok(TrustRootProvider::GenerateSelfSigned);
    };

    let cert_pem = std::fs::read_to_string(cert_path)
        .with_context(|| format!("failed to read CA certificate {}", cert_path.display()))?;
    let key_pem = Zeroizing::new(
        std::fs::read_to_string(key_path)
            .with_context(|| format!("failed to read CA key {}", key_path.display()))?,
    );

    info!(cert = %cert_path.display(), "using imported CA");
    Ok(TrustRootProvider::import(cert_pem, key_pem.as_str()))
}

/// Print what a secret would contain. Key material is never printed.
fn print_summary(bundle: &CredentialBundle) -> anyhow::Result<()> {
    println!("secret {} (role {})", bundle.name(), bundle.role());
    for field in bundle.field_names() {
        println!("  field {}", field);
    }

    let Some(cert_pem) = bundle
        .field_names()
        .filter(|f| !f.ends_with("-ca.crt"))
        .find(|f| f.ends_with(".crt"))
        .and_then(|f| bundle.field_str(f))
    else {
        return Ok(());
    };

    let info = CertificateInfo::from_pem(cert_pem)?;
    println!(
        "  subject CN={} O={}",
        info.common_name,
        info.organizations.join(",")
    );
    println!("  issuer CN={}", info.issuer_common_name);
    println!("  serial {}", info.serial_hex);
    println!("  valid {} .. {} (unix)", info.not_before, info.not_after);
    for name in &info.dns_names {
        println!("  dns {}", name);
    }
    for ip in &info.ip_addresses {
        println!("  ip {}", ip);
    }
    Ok(())
}
