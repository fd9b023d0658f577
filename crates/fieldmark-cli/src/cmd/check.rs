use crate::device::{FileCapture, FixedGeolocator};
use crate::output::print_json;
use crate::session::{connect, ConnectArgs};
use anyhow::Context;
use clap::{Args, ValueEnum};
use fieldmark_core::orchestrator::{ActionOutcome, Orchestrator};
use fieldmark_core::types::{ActionRequest, LogType};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Direction {
    In,
    Out,
}

impl From<Direction> for LogType {
    fn from(d: Direction) -> Self {
        match d {
            Direction::In => LogType::In,
            Direction::Out => LogType::Out,
        }
    }
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// in or out
    #[arg(value_enum)]
    pub direction: Direction,

    /// Employee id being recorded
    pub employee: String,

    /// Photo file taken at the site
    #[arg(long)]
    pub photo: PathBuf,

    /// Latitude of the fix
    #[arg(long, allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Longitude of the fix
    #[arg(long, allow_hyphen_values = true)]
    pub lng: Option<f64>,

    /// Fix accuracy in metres
    #[arg(long)]
    pub accuracy: Option<f64>,

    /// Act as if location permission was refused
    #[arg(long)]
    pub deny_location: bool,

    /// Supervisor employee id; resolved from the signed-in user when omitted
    #[arg(long)]
    pub supervisor: Option<String>,
}

pub fn run(root: &Path, args: CheckArgs, conn: &ConnectArgs, json: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(check(root, args, conn, json))
}

async fn check(root: &Path, args: CheckArgs, conn: &ConnectArgs, json: bool) -> anyhow::Result<()> {
    let (config, client) = connect(root, conn).await?;
    let client = Arc::new(client);

    let scope = match args.supervisor {
        Some(s) => s,
        None => {
            let roster = super::roster::load(&client).await?;
            if !roster.iter().any(|e| e.name == args.employee) {
                anyhow::bail!("{} is not on your roster", args.employee);
            }
            // display_roster puts the supervisor first
            roster
                .first()
                .map(|e| e.name.clone())
                .context("empty roster")?
        }
    };

    let orchestrator = Orchestrator::new(
        client,
        Arc::new(FileCapture::new(&args.photo)),
        Arc::new(FixedGeolocator::new(
            args.lat,
            args.lng,
            args.accuracy,
            args.deny_location,
        )),
        &config,
    );
    let mut events = orchestrator.subscribe();

    let request = ActionRequest::new(args.direction.into(), &args.employee, scope);
    match orchestrator.perform(request).await? {
        ActionOutcome::Success(receipt) => {
            if json {
                print_json(&receipt)?;
            } else if let Ok(event) = events.try_recv() {
                println!(
                    "{} recorded for {} (doc {})",
                    event.action, event.actor, event.record_id
                );
                if receipt.reused {
                    println!("  (an existing record for this submission was reused)");
                }
                if !receipt.photo_attached && !receipt.reused {
                    println!("  warning: the photo could not be attached");
                }
            }
            Ok(())
        }
        ActionOutcome::Failed { cause } => anyhow::bail!("{cause}"),
        ActionOutcome::LocationFailed(e) => {
            anyhow::bail!("{} ({})", e.guidance(), e.code_label())
        }
        ActionOutcome::Abandoned => anyhow::bail!(
            "no photo captured from {}",
            args.photo.display()
        ),
        ActionOutcome::Discarded => anyhow::bail!("the action was abandoned"),
    }
}
