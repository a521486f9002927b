//! Purpose: Hold top-level CLI command dispatch for `dexaudit`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Stores are opened read-only and dropped before the report is printed.
//! Invariants: A report is printed only after its engine returned successfully.

use super::*;

use dexaudit::core::aggregate;
use dexaudit::core::reconcile::reconcile;
use dexaudit::core::schema::RecordPrefix;
use dexaudit::core::store::RocksStore;
use dexaudit::report;

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Unprocessed(args) => {
            let node = RocksStore::open_read_only(&args.node)?;
            let matcher = RocksStore::open_read_only(&args.matcher)?;
            tracing::info!(
                node = %args.node.display(),
                matcher = %args.matcher.display(),
                "reconciling matcher transactions against node index"
            );
            let result = reconcile(&matcher, &node)?;
            drop(matcher);
            drop(node);

            if args.json {
                emit_json(report::weeks_json(&result))?;
            } else {
                emit_text(&report::render_weeks(&result))?;
            }
            Ok(RunOutcome::ok())
        }
        Command::Stats(args) => {
            let filter = args
                .prefix
                .as_deref()
                .map(RecordPrefix::parse)
                .transpose()?;
            let node = RocksStore::open_read_only(&args.node)?;
            let result = aggregate::collect(&node, filter, args.strategy.into(), args.workers)?;
            drop(node);

            if args.json {
                emit_json(report::type_stats_json(&result))?;
            } else {
                emit_text(&report::render_type_stats(&result))?;
            }
            Ok(RunOutcome::ok())
        }
        Command::Prefixes { json } => {
            if json {
                emit_json(report::record_types_json())?;
            } else {
                emit_text(&report::render_record_types())?;
            }
            Ok(RunOutcome::ok())
        }
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "dexaudit", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
    }
}
