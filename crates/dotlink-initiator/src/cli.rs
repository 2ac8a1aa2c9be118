//! CLI command definitions and argument parsing

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dotlink_core::harness::{demo_deployment, GatewayFaults};
use dotlink_core::soft::SoftFactory;
use dotlink_core::{run_sequential, FailureKind, HandshakeConfig, IdentityOutcome, SettleDelay};
use dotlink_transport::{MockTransport, StreamTransport};
use tokio::fs::{File, OpenOptions};
use tracing::{info, warn};

use crate::config::{ConfigError, DeploymentConfig};
use crate::frames;
use crate::output::{OutputFormat, OutputFormatter};
use crate::ExitCode;

/// dotlink-initiator - run DotBot handshakes over a serial link
#[derive(Parser, Debug)]
#[command(name = "dotlink-initiator")]
#[command(version, about = "Run DotBot robot handshakes against a gateway")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: table, json, quiet
    #[arg(long, default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug mode (frame-level tracing)
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the handshake for every identity in a deployment file
    Run(RunArgs),
    /// Decode a captured frame or message given as hex
    Decode(DecodeArgs),
    /// Run demo robots against an in-process simulated gateway
    Demo(DemoArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Deployment file
    #[arg(short, long, env = "DOTLINK_CONFIG")]
    pub config: PathBuf,

    /// Serial device, overriding `[port] path`
    #[arg(long)]
    pub port: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex bytes, HDLC framed or bare
    pub hex: String,
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Number of robots (ids a1044101 upwards)
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(1..=254))]
    pub count: u8,

    /// Pause before each advertisement, in milliseconds
    #[arg(long, default_value_t = SettleDelay::DEFAULT.as_duration().as_millis() as u64)]
    pub settle_ms: u64,

    /// Make the simulated gateway misbehave
    #[arg(long, value_enum)]
    pub fault: Option<DemoFault>,
}

/// Gateway misbehaviour the demo can inject.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DemoFault {
    TamperVoucher,
    OmitVoucher,
    UnknownCredential,
    ForgeMac2,
    ForeignFrame,
    WrongReplyType,
    Silent,
}

impl From<DemoFault> for GatewayFaults {
    fn from(fault: DemoFault) -> Self {
        let mut faults = GatewayFaults::default();
        match fault {
            DemoFault::TamperVoucher => faults.tamper_voucher = true,
            DemoFault::OmitVoucher => faults.omit_voucher = true,
            DemoFault::UnknownCredential => faults.unknown_credential = true,
            DemoFault::ForgeMac2 => faults.forge_mac_2 = true,
            DemoFault::ForeignFrame => faults.foreign_frame_first = Some(0xdead_beef),
            DemoFault::WrongReplyType => faults.wrong_reply_type = true,
            DemoFault::Silent => faults.silent = true,
        }
        faults
    }
}

impl Cli {
    /// Load the deployment file when the command needs one.
    pub fn load_deployment(&self) -> Result<Option<DeploymentConfig>, ConfigError> {
        match &self.command {
            Commands::Run(args) => DeploymentConfig::load(&args.config).map(Some),
            Commands::Decode(_) | Commands::Demo(_) => Ok(None),
        }
    }

    /// Execute the CLI command with a pre-loaded deployment
    pub async fn execute(self, deployment: Option<DeploymentConfig>) -> anyhow::Result<ExitCode> {
        let formatter = OutputFormatter::new(self.output);

        match self.command {
            Commands::Run(args) => {
                let deployment = match deployment {
                    Some(deployment) => deployment,
                    None => DeploymentConfig::load(&args.config)?,
                };
                run(args, deployment, &formatter).await
            }
            Commands::Decode(args) => decode(&args, &formatter),
            Commands::Demo(args) => demo(&args, &formatter).await,
        }
    }
}

async fn run(
    args: RunArgs,
    deployment: DeploymentConfig,
    formatter: &OutputFormatter,
) -> anyhow::Result<ExitCode> {
    let identities = deployment.load_identities()?;
    let peer = deployment.peer_reference()?;
    let resolver = deployment.load_resolver()?;
    if resolver.is_empty() {
        warn!("no responder credentials configured, only inline credentials will resolve");
    }
    let path = args.port.unwrap_or_else(|| deployment.port.path.clone());

    let mut transport = open_port(&path).await?;
    info!(
        port = %path.display(),
        identities = identities.len(),
        responder_credentials = resolver.len(),
        "link open"
    );

    let outcomes = run_sequential(
        &mut transport,
        &identities,
        &peer,
        &SoftFactory,
        Arc::new(resolver),
        &deployment.handshake,
    )
    .await;

    print_output(&formatter.format_outcomes(&outcomes, "run"));
    Ok(exit_code_for(&outcomes))
}

/// Open a serial device (or pty) as separate read and write handles.
async fn open_port(path: &Path) -> anyhow::Result<StreamTransport<File, File>> {
    let writer = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("failed to open serial port {}", path.display()))?;
    let reader = writer
        .try_clone()
        .await
        .with_context(|| format!("failed to clone handle for {}", path.display()))?;
    Ok(StreamTransport::new(reader, writer))
}

fn decode(args: &DecodeArgs, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
    match frames::inspect_hex(&args.hex) {
        Ok(summary) => {
            print_output(&formatter.format_frame(&summary));
            Ok(ExitCode::Success)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            Ok(ExitCode::InvalidInput)
        }
    }
}

async fn demo(args: &DemoArgs, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
    let deployment = demo_deployment(args.count)?;
    let mut gateway = deployment.gateway;
    if let Some(fault) = args.fault {
        gateway.set_faults(fault.into());
    }
    let gateway = gateway.into_shared();
    let mut transport = MockTransport::new().with_responder(gateway.responder());

    let config = HandshakeConfig {
        settle_delay: SettleDelay::from_millis(args.settle_ms),
        ..HandshakeConfig::default()
    };

    let outcomes = run_sequential(
        &mut transport,
        &deployment.identities,
        &deployment.peer,
        &SoftFactory,
        Arc::new(deployment.resolver),
        &config,
    )
    .await;

    {
        let gateway = gateway.lock();
        for outcome in &outcomes {
            let Ok(report) = &outcome.result else { continue };
            if gateway.key_for(outcome.device.address()) != Some(&report.key_material) {
                warn!(device = %outcome.device, "gateway derived a different key");
            }
        }
        info!(
            advertised = gateway.advertised().len(),
            rejected = gateway.rejected().len(),
            "simulated gateway finished"
        );
    }

    print_output(&formatter.format_outcomes(&outcomes, "demo"));
    Ok(exit_code_for(&outcomes))
}

fn print_output(text: &str) {
    if !text.is_empty() {
        println!("{text}");
    }
}

/// Success when every identity got through; timeout when every failure was one.
pub fn exit_code_for(outcomes: &[IdentityOutcome]) -> ExitCode {
    let kinds: Vec<FailureKind> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().err().map(|f| f.kind()))
        .collect();

    if kinds.is_empty() {
        ExitCode::Success
    } else if kinds.iter().all(|k| *k == FailureKind::TransportTimeout) {
        ExitCode::Timeout
    } else {
        ExitCode::HandshakeFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dotlink_core::{DeviceId, HandshakeError, HandshakeFailure, Stage};
    use std::time::Duration;

    fn failed(id: &str, error: HandshakeError) -> IdentityOutcome {
        let device = DeviceId::from_hex(id).unwrap();
        IdentityOutcome {
            device: device.clone(),
            result: Err(HandshakeFailure {
                device,
                stage: Stage::Sent1,
                error,
            }),
        }
    }

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "dotlink-initiator",
            "run",
            "--config",
            "deployment.toml",
            "--port",
            "/dev/pts/76",
            "--output",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.output, OutputFormat::Json);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.config, PathBuf::from("deployment.toml"));
        assert_eq!(args.port, Some(PathBuf::from("/dev/pts/76")));
    }

    #[test]
    fn test_parse_demo_defaults_and_fault() {
        let cli = Cli::try_parse_from(["dotlink-initiator", "demo"]).unwrap();
        let Commands::Demo(args) = cli.command else {
            panic!("expected demo command");
        };
        assert_eq!(args.count, 4);
        assert_eq!(args.settle_ms, 1000);
        assert_eq!(args.fault, None);

        let cli =
            Cli::try_parse_from(["dotlink-initiator", "demo", "--fault", "tamper-voucher"])
                .unwrap();
        let Commands::Demo(args) = cli.command else {
            panic!("expected demo command");
        };
        assert_eq!(args.fault, Some(DemoFault::TamperVoucher));
        assert!(GatewayFaults::from(DemoFault::TamperVoucher).tamper_voucher);

        assert!(Cli::try_parse_from(["dotlink-initiator", "demo", "--count", "0"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&[]), ExitCode::Success);

        let timeout = || {
            failed(
                "a1044101",
                HandshakeError::TransportTimeout {
                    waited: Duration::from_secs(30),
                    attempts: 30,
                },
            )
        };
        assert_eq!(exit_code_for(&[timeout()]), ExitCode::Timeout);

        let mixed = [timeout(), failed("a1044102", HandshakeError::CryptoVerification)];
        assert_eq!(exit_code_for(&mixed), ExitCode::HandshakeFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_demo_establishes_every_robot() {
        let args = DemoArgs {
            count: 2,
            settle_ms: 10,
            fault: None,
        };
        let code = demo(&args, &OutputFormatter::new(OutputFormat::Quiet)).await.unwrap();
        assert_eq!(code, ExitCode::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_demo_with_tampered_voucher_fails() {
        let args = DemoArgs {
            count: 1,
            settle_ms: 10,
            fault: Some(DemoFault::TamperVoucher),
        };
        let code = demo(&args, &OutputFormatter::new(OutputFormat::Quiet)).await.unwrap();
        assert_eq!(code, ExitCode::HandshakeFailed);
    }
}
