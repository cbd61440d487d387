//! Command line of the operational binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Administration tool for the study data store
#[derive(Parser, Debug)]
#[command(name = "studyhub")]
#[command(version)]
pub struct Cli {
    /// Mail a report to the configured sysadmins when a command fails
    #[arg(long, global = true, env = "STUDYHUB_EMAIL_ERRORS")]
    pub email_errors: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Create a study and its default device settings
    CreateStudy(CreateStudyArgs),
    /// Create a researcher account
    CreateResearcher(CreateResearcherArgs),
    /// Issue a new access key pair for a researcher, revoking the old one
    ResetResearcherAccessKey(ResetAccessKeyArgs),
    /// Enroll a participant with a generated id and password
    RegisterParticipant(RegisterParticipantArgs),
    /// Print the deployment option list as JSON
    DeployConfig(DeployConfigArgs),
}

#[derive(clap::Args, Debug)]
pub struct CreateStudyArgs {
    #[arg(long)]
    pub name: String,

    /// 32 characters; generated when omitted
    #[arg(long)]
    pub encryption_key: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct CreateResearcherArgs {
    #[arg(long)]
    pub username: String,

    /// Generated and printed when omitted
    #[arg(long, env = "STUDYHUB_RESEARCHER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long)]
    pub admin: bool,

    /// Studies to add the researcher to
    #[arg(long = "study")]
    pub studies: Vec<i64>,
}

#[derive(clap::Args, Debug)]
pub struct ResetAccessKeyArgs {
    #[arg(long)]
    pub username: String,
}

#[derive(clap::Args, Debug)]
pub struct RegisterParticipantArgs {
    #[arg(long)]
    pub study_id: i64,
}

#[derive(clap::Args, Debug)]
pub struct DeployConfigArgs {
    /// JSON object of environment variables
    #[arg(long)]
    pub environment: PathBuf,

    /// JSON option template; the built-in table is used when omitted
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Value for an auto-generated option, as NAME=VALUE
    #[arg(long = "provisioned", value_parser = parse_key_value)]
    pub provisioned: Vec<(String, String)>,

    /// Leave auto-generated options as markers instead of resolving them
    #[arg(long)]
    pub unresolved: bool,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got {raw:?}"))
}
