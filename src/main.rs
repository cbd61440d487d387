use std::collections::HashMap;

use anyhow::Context;
use clap::Parser;
use serde_json::json;

use studyhub::auth::password::{generate_easy_alphanumeric_string, generate_encryption_key, EASY_STRING_LEN};
use studyhub::config::AppConfig;
use studyhub::deploy::{self, default_template};
use studyhub::participants::Participant;
use studyhub::reporting::{log_and_email_error, log_error, SmtpMailer};
use studyhub::researchers::Researcher;
use studyhub::store::PgStore;
use studyhub::study::Study;

mod cli;

use crate::cli::{Cli, Commands, CreateResearcherArgs, DeployConfigArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "studyhub=debug,sqlx=warn".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let email_errors = cli.email_errors;

    let result = run(cli.command, &config).await;
    if let Err(e) = &result {
        if email_errors {
            let mailer = SmtpMailer::new(&config.smtp);
            log_and_email_error(&mailer, &config.smtp, e, Some("studyhub command failed"), None)
                .await;
        } else {
            let _ = log_error(e, Some("studyhub command failed"), false);
        }
    }
    result
}

async fn run(command: Commands, config: &AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::Migrate => {
            let store = PgStore::connect(config).await?;
            store.migrate().await?;
            tracing::info!("migrations applied");
        }
        Commands::CreateStudy(args) => {
            let store = PgStore::connect(config).await?;
            let key = args.encryption_key.unwrap_or_else(generate_encryption_key);
            let (study, settings) = Study::create(&store, &args.name, &key)
                .await
                .context("creating study")?;
            print_json(&json!({
                "study_id": study.id,
                "device_settings_id": settings.id,
                "encryption_key": study.encryption_key,
            }))?;
        }
        Commands::CreateResearcher(args) => create_researcher(config, args).await?,
        Commands::ResetResearcherAccessKey(args) => {
            let store = PgStore::connect(config).await?;
            let mut researcher = Researcher::find_by_username(&store, &args.username)
                .await?
                .with_context(|| format!("no researcher named {:?}", args.username))?;
            let (access_key_id, secret) = researcher.reset_access_credentials(&store).await?;
            print_json(&json!({
                "access_key_id": access_key_id,
                "access_key_secret": secret,
            }))?;
        }
        Commands::RegisterParticipant(args) => {
            let store = PgStore::connect(config).await?;
            let study = Study::find(&store, args.study_id)
                .await?
                .with_context(|| format!("no study with id {}", args.study_id))?;
            let (participant, password) = Participant::register(&store, study.id).await?;
            print_json(&json!({
                "patient_id": participant.patient_id,
                "password": password,
            }))?;
        }
        Commands::DeployConfig(args) => deploy_config(args)?,
    }
    Ok(())
}

async fn create_researcher(config: &AppConfig, args: CreateResearcherArgs) -> anyhow::Result<()> {
    let store = PgStore::connect(config).await?;
    let generated = args.password.is_none();
    let password = args
        .password
        .unwrap_or_else(|| generate_easy_alphanumeric_string(EASY_STRING_LEN));

    let mut researcher = Researcher::create(&store, &args.username, &password)
        .await
        .with_context(|| format!("creating researcher {:?}", args.username))?;
    if args.admin {
        researcher.elevate_to_admin(&store).await?;
    }
    for study_id in args.studies {
        let study = Study::find(&store, study_id)
            .await?
            .with_context(|| format!("no study with id {study_id}"))?;
        study.add_researcher(&store, &researcher).await?;
    }

    print_json(&json!({
        "researcher_id": researcher.id,
        "admin": researcher.admin,
        "password": generated.then_some(password),
    }))
}

fn deploy_config(args: DeployConfigArgs) -> anyhow::Result<()> {
    let env = deploy::load_environment(&args.environment)?;
    let template = match &args.template {
        Some(path) => deploy::load_template(path)?,
        None => default_template(),
    };
    let options = deploy::build_configuration(&env, template);
    if args.unresolved {
        return print_json(&options);
    }
    let provisioned: HashMap<String, String> = args.provisioned.into_iter().collect();
    let resolved = deploy::resolve(options, &provisioned)?;
    print_json(&resolved)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
