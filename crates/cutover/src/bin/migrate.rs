use clap::{Arg, ArgAction, Command};
use cutover::cli::{init_tracing, with_common_args, Invocation};
use cutover::{ForwardContext, MigrationDeployer, MigrationRun};

#[tokio::main]
async fn main() {
    let cli = with_common_args(
        Command::new("migrate")
            .version(cutover::VERSION)
            .about("Guarded forward migration to the new system")
            .arg(
                Arg::new("dry-run")
                    .long("dry-run")
                    .action(ArgAction::SetTrue)
                    .help("Validate only; write no backup, deployment or log"),
            )
            .arg(
                Arg::new("backup-id")
                    .long("backup-id")
                    .value_name("ID")
                    .help("Reuse an existing backup instead of creating one"),
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
    let migration = MigrationRun::new()
        .dry_run(matches.get_flag("dry-run"))
        .with_backup_id(matches.get_one::<String>("backup-id").cloned());
    let store = invocation.connect_store(migration.run_id.to_string())?;

    let Invocation { root, settings, env } = invocation;
    let layout = settings.paths.layout(&root);
    let deployer = MigrationDeployer::new(settings, layout, env, store);
    let mut ctx = ForwardContext::new(migration);

    match deployer.execute(&mut ctx).await {
        Ok(result) => {
            println!("{}", deployer.report(&ctx, &result));
            Ok(result.success)
        }
        Err(e) => {
            println!("{}", deployer.report(&ctx, e.partial_result()));
            eprintln!("❌ {e}");
            Ok(false)
        }
    }
}
