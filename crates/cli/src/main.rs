mod render;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use calltree_core::model::FunctionGroup;
use calltree_core::{CallTreeView, NodeKey, parse_collapsed};
use calltree_protocol::CallTreeSettings;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

const BUILD_TIMEOUT: Duration = Duration::from_secs(60);

/// Print the call tree of a folded stack profile, or the callers and callees
/// of one function.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Folded stack file (`frame;frame;... count` per line)
    file: PathBuf,

    /// Show callers and callees of this function instead of the call tree
    #[arg(short, long)]
    function: Option<String>,

    /// Merge all instances of the function into one
    #[arg(short, long)]
    combine: bool,

    /// Render names as `module!function`
    #[arg(long)]
    prepend_module: bool,

    /// Highlight rows whose name contains this text
    #[arg(short, long)]
    search: Option<String>,

    /// Only print the hottest path from the first row
    #[arg(long)]
    hot_path: bool,

    /// Levels followed by --hot-path
    #[arg(long)]
    depth: Option<usize>,

    /// Duration of one sample in microseconds
    #[arg(long)]
    interval_us: Option<u64>,

    /// Print the N functions with the most exclusive time instead of a tree
    #[arg(long, value_name = "N")]
    top: Option<usize>,

    /// JSON settings file; flags override its values
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    fn settings(&self) -> Result<CallTreeSettings> {
        let mut settings = match &self.settings {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                CallTreeSettings::from_json(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => CallTreeSettings::default(),
        };
        settings.combine_instances |= self.combine;
        settings.prepend_module |= self.prepend_module;
        if let Some(depth) = self.depth {
            settings.hot_path_depth = depth;
        }
        if let Some(interval) = self.interval_us {
            settings.sample_interval_us = interval;
        }
        Ok(settings)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so the tree on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let settings = cli.settings()?;
    let data =
        std::fs::read(&cli.file).with_context(|| format!("reading {}", cli.file.display()))?;
    let calls = Arc::new(parse_collapsed(&data, settings.sample_interval())?);
    info!(
        nodes = calls.node_count(),
        total = ?calls.total_weight(),
        "profile loaded"
    );

    let function = match &cli.function {
        Some(name) => match calls.find_function(name) {
            Some(id) => Some(id),
            None => bail!("function {name:?} not found in {}", cli.file.display()),
        },
        None => None,
    };

    if let Some(limit) = cli.top {
        let summaries = match function {
            Some(id) => calls.top_functions(NodeKey::Group(FunctionGroup::all(id))),
            None => calls.profile_functions(),
        };
        return render::write_top_functions(&calls, &summaries, limit, &settings);
    }

    let mut view = CallTreeView::new(settings);
    view.set_source(calls);
    match function {
        Some(id) => view.build_caller_callee(id)?,
        None => view.build_top_down()?,
    };
    view.wait(BUILD_TIMEOUT)?;

    let search = cli.search.as_deref().unwrap_or_default();
    if !search.is_empty() {
        let (count, _) = view.search(search);
        info!(count, text = search, "search finished");
    }

    let rows = if cli.hot_path {
        // Self rows of a caller/callee view may have nothing below them.
        let start = view.tree().and_then(|tree| {
            tree.children(tree.root())
                .iter()
                .copied()
                .find(|&id| !tree.children(id).is_empty())
        });
        if let Some(start) = start {
            view.expand_hottest_path(start);
        }
        view.visible_rows()
    } else {
        view.all_rows()
    };
    render::write_rows(&rows)?;

    if !search.is_empty() {
        render::write_status(&view.search_status())?;
    }
    Ok(())
}
