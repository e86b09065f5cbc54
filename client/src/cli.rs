//! Command-line surface and the query pipeline behind it.

use crate::catalog;
use crate::collate::{run_collation, write_summary, CollateOptions, Collator, Tally};
use crate::error::{DirectoryError, Result};
use crate::fields::Registry;
use crate::fieldspec::parse_fields;
use crate::network::DEFAULT_MASTER;
use crate::query::{
    DirectoryQuery, ErrorSummary, ExecutionMode, Orchestrator, QueryBackend, QueryOptions,
};
use crate::record::{Selection, Target};
use crate::render::{
    DetailJsonRenderer, DetailTextRenderer, JsonRenderer, Renderer, TextOptions, TextRenderer,
};
use clap::{Parser, ValueEnum};
use log::info;
use shared::Region;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Query Source engine game servers", long_about = None)]
pub struct Args {
    /// Servers to query directly instead of asking the master server
    pub servers: Vec<String>,

    /// Fields to show, optionally with a column width (see --list-fields)
    #[arg(short = 'f', long, default_value = "ip=21,name")]
    pub fields: String,

    /// Master server region (see --list-regions)
    #[arg(short = 'r', long, default_value = "USW")]
    pub region: String,

    /// Raw master server filter, e.g. \gamedir\tf (see --list-filters)
    #[arg(long, default_value = "")]
    pub filter: String,

    /// Query one server at a time
    #[arg(long)]
    pub serial: bool,

    /// Don't print the header line
    #[arg(long)]
    pub no_header: bool,

    /// Include servers that did not answer
    #[arg(long)]
    pub show_unreachable: bool,

    /// Print the distinct errors seen after the results
    #[arg(long)]
    pub show_errors: bool,

    /// Show at most this many servers
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Seconds to wait for each server reply
    #[arg(short = 't', long, default_value = "1", value_parser = parse_seconds)]
    pub timeout: Duration,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// Text placed between columns
    #[arg(short = 'd', long, default_value = " ¦ ")]
    pub divider: String,

    /// List the known fields and exit
    #[arg(long)]
    pub list_fields: bool,

    /// List the known master server filters and exit
    #[arg(long)]
    pub list_filters: bool,

    /// List the valid regions and exit
    #[arg(long)]
    pub list_regions: bool,

    /// Print a full report per server instead of one line each
    #[arg(long)]
    pub detail: bool,

    /// Skip server info in the detail report
    #[arg(long)]
    pub no_info: bool,

    /// Skip rules in the detail report
    #[arg(long)]
    pub no_rules: bool,

    /// Skip the player list in the detail report
    #[arg(long)]
    pub no_players: bool,

    /// Master server address
    #[arg(long, default_value = DEFAULT_MASTER)]
    pub master: String,

    /// Address to resume master enumeration after
    #[arg(long, default_value = "0.0.0.0:0")]
    pub start: String,

    /// Seconds to wait for each master server page
    #[arg(long, default_value = "5", value_parser = parse_seconds)]
    pub master_timeout: Duration,
}

fn parse_seconds(s: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", s))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("'{}' is not a valid duration", s))
}

impl Args {
    pub fn selection(&self) -> Selection {
        if self.detail {
            Selection {
                info: !self.no_info,
                rules: !self.no_rules,
                players: !self.no_players,
            }
        } else {
            Selection::INFO_ONLY
        }
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            mode: if self.serial {
                ExecutionMode::Serial
            } else {
                ExecutionMode::Parallel
            },
            selection: self.selection(),
            timeout: self.timeout,
        }
    }

    pub fn collate_options(&self) -> CollateOptions {
        CollateOptions {
            // The detail report is where failures are meant to be read.
            show_unreachable: self.show_unreachable || self.detail,
            limit: self.limit,
        }
    }

    pub fn text_options(&self) -> TextOptions {
        TextOptions {
            divider: self.divider.clone(),
            header: !self.no_header,
        }
    }

    fn lists_only(&self) -> bool {
        self.list_fields || self.list_filters || self.list_regions
    }
}

/// Runs one invocation: listings, or query then render.
///
/// Results go to `out`, the summary to `diag`. Returns the batch tally, or
/// `None` when only listings were printed.
pub async fn run<B, O, E>(
    args: &Args,
    backend: Arc<B>,
    out: &mut O,
    diag: &mut E,
) -> Result<Option<Tally>>
where
    B: QueryBackend,
    O: Write,
    E: Write,
{
    let registry = Registry::standard();

    if args.lists_only() {
        if args.list_fields {
            catalog::write_fields(out, &registry)?;
        }
        if args.list_filters {
            catalog::write_filters(out)?;
        }
        if args.list_regions {
            catalog::write_regions(out)?;
        }
        return Ok(None);
    }

    // Both checks come before any network activity.
    let fields = parse_fields(&args.fields, &registry)?;
    let region: Region = args.region.parse().map_err(DirectoryError::from)?;

    let errors = ErrorSummary::new();
    let orchestrator = Orchestrator::new(backend, args.query_options(), errors.clone());

    let targets = if args.servers.is_empty() {
        let query = DirectoryQuery {
            region,
            start: args.start.clone(),
            filter: args.filter.clone(),
            timeout: args.master_timeout,
        };
        orchestrator.enumerate(&query).await?
    } else {
        Target::explicit_list(args.servers.iter().cloned())
    };
    if targets.is_empty() {
        info!("No servers to query");
    }

    let rx = orchestrator.dispatch(targets);
    let collator = Collator::new(args.collate_options());

    let mut renderer: Box<dyn Renderer + '_> = match (args.detail, args.format) {
        (false, Format::Text) => Box::new(TextRenderer::new(
            &mut *out,
            fields,
            args.text_options(),
        )),
        (false, Format::Json) => Box::new(JsonRenderer::new(&mut *out, fields)),
        (true, Format::Text) => Box::new(DetailTextRenderer::new(&mut *out, &registry)),
        (true, Format::Json) => Box::new(DetailJsonRenderer::new(&mut *out)),
    };
    let tally = run_collation(rx, collator, renderer.as_mut()).await?;
    drop(renderer);

    info!(
        "{} servers answered, {} unreachable, {} shown",
        tally.received - tally.unreachable,
        tally.unreachable,
        tally.shown
    );
    write_summary(diag, &tally, &errors, args.show_errors)?;
    Ok(Some(tally))
}
