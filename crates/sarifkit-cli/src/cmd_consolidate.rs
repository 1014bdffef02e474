use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use sarifkit::v1::TrimPolicy;
use sarifkit::v1::consolidate::{RegionComponents, consolidate_log};
use std::path::PathBuf;

use crate::files;

#[derive(Args, Debug)]
pub struct ConsolidateArgs {
    /// Input file (use - for stdin)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON trim policy file; flags below are added on top of it
    #[arg(long)]
    pub policy: Option<PathBuf>,

    #[arg(long)]
    pub remove_code_flows: bool,

    #[arg(long)]
    pub remove_related_locations: bool,

    /// Remove graphs and graph traversals
    #[arg(long)]
    pub remove_graphs: bool,

    #[arg(long)]
    pub remove_stacks: bool,

    #[arg(long)]
    pub remove_web_requests: bool,

    #[arg(long)]
    pub remove_web_responses: bool,

    /// Remove originalUriBaseIds and artifact uriBaseIds
    #[arg(long)]
    pub remove_uri_base_ids: bool,

    /// Truncate result messages to this many characters
    #[arg(long)]
    pub message_limit: Option<usize>,

    /// Region representation to keep when several are present
    #[arg(long, value_enum)]
    pub region_components: Option<RegionArg>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum RegionArg {
    LineAndColumn,
    ByteOffsetAndLength,
    CharOffsetAndLength,
    Full,
}

impl From<RegionArg> for RegionComponents {
    fn from(arg: RegionArg) -> Self {
        match arg {
            RegionArg::LineAndColumn => RegionComponents::LineAndColumn,
            RegionArg::ByteOffsetAndLength => RegionComponents::ByteOffsetAndLength,
            RegionArg::CharOffsetAndLength => RegionComponents::CharOffsetAndLength,
            RegionArg::Full => RegionComponents::Full,
        }
    }
}

pub fn run(args: ConsolidateArgs, pretty: bool) -> Result<()> {
    let policy = build_policy(&args)?;
    let mut log = files::read_log(&args.input)?;

    let stats = consolidate_log(&mut log, &policy);
    tracing::info!(
        total_locations = stats.total_locations,
        unique_locations = stats.unique_locations,
        total_thread_flow_locations = stats.total_thread_flow_locations,
        unique_thread_flow_locations = stats.unique_thread_flow_locations,
        "consolidated {} run(s)",
        log.runs.len()
    );

    let json = files::format_log(&log, pretty)?;
    files::write_output(&json, args.output.as_ref())
}

fn build_policy(args: &ConsolidateArgs) -> Result<TrimPolicy> {
    let mut policy = match &args.policy {
        Some(path) => {
            let text = files::read_input(path)?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse policy {:?}", path))?
        }
        None => TrimPolicy::default(),
    };

    policy.remove_code_flows |= args.remove_code_flows;
    policy.remove_related_locations |= args.remove_related_locations;
    policy.remove_graphs |= args.remove_graphs;
    policy.remove_stacks |= args.remove_stacks;
    policy.remove_web_requests |= args.remove_web_requests;
    policy.remove_web_responses |= args.remove_web_responses;
    policy.remove_uri_base_ids |= args.remove_uri_base_ids;
    if args.message_limit.is_some() {
        policy.message_length_limit = args.message_limit;
    }
    if let Some(region) = args.region_components {
        policy.region_components = region.into();
    }

    Ok(policy)
}
