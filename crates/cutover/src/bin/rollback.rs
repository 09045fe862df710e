use clap::{Arg, ArgAction, Command};
use cutover::cli::{init_tracing, with_common_args, Invocation};
use cutover::{MigrationRollback, RollbackContext};
use cutover_gateway::SendGridNotifier;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = with_common_args(
        Command::new("rollback")
            .version(cutover::VERSION)
            .about("Restore configuration and data from a migration backup")
            .arg(
                Arg::new("backup-id")
                    .value_name("BACKUP_ID")
                    .help("Backup to restore; omit to list available backups"),
            )
            .arg(
                Arg::new("force")
                    .long("force")
                    .action(ArgAction::SetTrue)
                    .help("Continue past critical step failures"),
            )
            .arg(
                Arg::new("notify")
                    .long("notify")
                    .action(ArgAction::SetTrue)
                    .help("Email the operator when done"),
            ),
    );
    let matches = cli.get_matches();
    init_tracing(matches.get_flag("log-json"));

    let code = match run(&matches).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            eprintln!("❌ {e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(matches: &clap::ArgMatches) -> anyhow::Result<bool> {
    let invocation = Invocation::from_matches(matches)?;
    let layout = invocation.settings.paths.layout(&invocation.root);

    let Some(backup_id) = matches.get_one::<String>("backup-id").cloned() else {
        let backups = cutover_backup::BackupStore::new(&layout.backups);
        println!("Usage: rollback <backup-id> [--force] [--notify]");
        println!();
        println!("Available backups:");
        let ids = backups.list_ids()?;
        if ids.is_empty() {
            println!("  (none in {})", layout.backups.display());
        }
        for id in ids {
            println!("  {id}");
        }
        return Ok(false);
    };
    let force = matches.get_flag("force");
    let notify = matches.get_flag("notify");

    let run_id = ulid::Ulid::new();
    let store = invocation.connect_store(run_id.to_string())?;
    let sendgrid = invocation.env.sendgrid();

    let Invocation { settings, env, .. } = invocation;
    let mut rollback = MigrationRollback::new(settings, layout, env, store);
    if let Some(sendgrid) = sendgrid {
        match SendGridNotifier::new(&sendgrid.api_key) {
            Ok(notifier) => rollback = rollback.with_notifier(Arc::new(notifier), sendgrid.from),
            Err(e) => tracing::warn!("notifications disabled: {}", e),
        }
    }

    let mut run = rollback.run_for(&backup_id, force, notify);
    run.run_id = run_id;
    let mut ctx = RollbackContext::new(run);
    match rollback.execute(&mut ctx).await {
        Ok(result) => {
            println!("{}", rollback.report(&ctx, &result));
            Ok(result.success || force)
        }
        Err(e) => {
            println!("{}", rollback.report(&ctx, e.partial_result()));
            eprintln!("❌ {e}");
            Ok(false)
        }
    }
}
