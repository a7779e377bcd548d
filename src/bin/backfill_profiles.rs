use profile_backfill::backfill::{BackfillOptions, BackfillProfilesStats, backfill_profiles};
use profile_backfill::clients::FirebaseClients;
use profile_backfill::config::{Config, Invocation};
use profile_backfill::credentials::{load_service_account, resolve_credentials_path};
use profile_backfill::error::BackfillError;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let invocation = Invocation::from_args(std::env::args().skip(1));

    match run(invocation).await {
        Ok(stats) => println!("{stats}"),
        Err(e) => {
            tracing::error!(error = %e, "Profile backfill failed");
            eprintln!("[error] {e}");
            std::process::exit(1);
        }
    }
}

async fn run(invocation: Invocation) -> Result<BackfillProfilesStats, BackfillError> {
    let config = Config::from_env()?;
    let key_path = resolve_credentials_path(
        invocation.credentials_arg.as_deref(),
        config.google_application_credentials.as_deref(),
        &std::env::current_dir()?,
    )?;
    let service_account = load_service_account(&key_path)?;
    let clients = FirebaseClients::new(&config, service_account)?;

    let options = BackfillOptions {
        dry_run: invocation.dry_run,
        page_size: config.page_size,
    };
    tracing::info!(
        project_id = %clients.project_id,
        dry_run = options.dry_run,
        "Starting profile backfill"
    );
    let stats = backfill_profiles(&clients.accounts, &clients.profiles, options).await?;
    tracing::info!(
        total_users = stats.total_users,
        updated_users = stats.updated_users,
        "Profile backfill completed"
    );
    Ok(stats)
}
