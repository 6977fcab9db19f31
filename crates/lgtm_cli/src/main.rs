//! lgtm CLI - manage the projects an lgtm.com account follows.

mod commands;
mod config;
mod duration;
mod progress;
mod shutdown;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use crate::duration::parse_duration;

#[derive(Parser)]
#[command(name = "lgtm")]
#[command(version)]
#[command(about = "Manage the projects you follow on lgtm.com")]
#[command(
    long_about = "lgtm follows, unfollows and organizes lgtm.com projects in bulk. Candidate \
repositories are compared against the projects you already follow, and only the difference is \
sent, a few requests at a time."
)]
#[command(after_long_help = r#"EXAMPLES
    Follow every repository of an organization:
        $ lgtm follow kubernetes

    Follow repositories listed in a file, pausing after each brand-new one:
        $ lgtm --wait 30s follow -f repos.txt

    Unfollow everything from one owner except a single repository:
        $ lgtm unfollow github.com/acme -e acme/keep-me

    Run a query on every followed Go project:
        $ lgtm query --lang go --query find-bugs.ql --all

CONFIGURATION
    lgtm reads configuration from:
      1. ~/.config/lgtm/config.toml (or $XDG_CONFIG_HOME/lgtm/config.toml)
      2. ./lgtm.toml
      3. The credentials file given with --conf or LGTM_CLI_CONFIG
      4. Environment variables (LGTM_* prefix, __ between sections)
      5. .env file in current directory

ENVIRONMENT VARIABLES
    LGTM_CLI_CONFIG               Path to the credentials.json file
    LGTM_API_VERSION              Internal API version
    LGTM_SESSION__NONCE           Session nonce
    LGTM_SESSION__SHORT_SESSION   Short session cookie
    LGTM_SESSION__LONG_SESSION    Long session cookie
    LGTM_GITHUB__TOKEN            GitHub token used to expand owners and searches
"#)]
pub(crate) struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command.
#[derive(Debug, Clone, Args)]
pub(crate) struct GlobalOptions {
    /// Path to the credentials.json file
    #[arg(long, global = true, env = "LGTM_CLI_CONFIG")]
    pub(crate) conf: Option<PathBuf>,

    /// Pause after following a project lgtm.com has never seen (e.g. 30s, 5m)
    #[arg(long, global = true, value_parser = parse_duration)]
    pub(crate) wait: Option<Duration>,

    /// Carry on item by item if the followed list can't be fetched
    #[arg(long, global = true)]
    pub(crate) ignore_followed_errors: bool,

    /// Don't fetch the followed list; look projects up one by one
    #[arg(long, global = true)]
    pub(crate) nocache: bool,

    /// Maximum concurrent requests (default from config or 6)
    #[arg(short = 'c', long, global = true)]
    pub(crate) concurrency: Option<usize>,

    /// Answer yes to every confirmation
    #[arg(short = 'y', long, global = true)]
    pub(crate) yes: bool,
}

/// Repositories given inline or in files.
#[derive(Debug, Clone, Default, Args)]
pub(crate) struct TargetArgs {
    /// Repository URLs, owner/repo pairs or owners
    pub(crate) targets: Vec<String>,

    /// File with one repository per line (can specify multiple)
    #[arg(short = 'f', long = "repos")]
    pub(crate) files: Vec<PathBuf>,

    /// Skip projects matching this glob, e.g. acme/* (can specify multiple)
    #[arg(short = 'e', long)]
    pub(crate) exclude: Vec<String>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Unfollow every followed project
    UnfollowAll,
    /// Unfollow projects by glob, owner or URL
    Unfollow {
        #[command(flatten)]
        targets: TargetArgs,
    },
    /// Follow repositories; owners expand to all their repositories
    Follow {
        #[command(flatten)]
        targets: TargetArgs,

        /// Only expand owners into repositories in this language
        #[arg(short, long)]
        lang: Option<String>,
    },
    /// Follow the most starred repositories in a language
    #[cfg(feature = "github")]
    FollowByLang {
        lang: String,

        #[arg(short = 'e', long)]
        exclude: Vec<String>,
    },
    /// Follow repositories matching a GitHub repository search
    #[cfg(feature = "github")]
    FollowBySearchMeta {
        query: String,

        #[arg(short = 'e', long)]
        exclude: Vec<String>,
    },
    /// Follow repositories containing code matching a GitHub code search
    #[cfg(feature = "github")]
    FollowByCodeSearch {
        query: String,

        #[arg(short = 'e', long)]
        exclude: Vec<String>,
    },
    /// Follow repositories importing a Go package (per pkg.go.dev)
    #[cfg(feature = "discovery")]
    FollowByImporters {
        /// Go package path, e.g. github.com/pkg/errors
        package: String,

        /// Follow at most this many importers (0 for all)
        #[arg(long, default_value_t = 0)]
        limit: usize,

        #[arg(short = 'e', long)]
        exclude: Vec<String>,
    },
    /// Add followed projects to a list
    AddToList {
        /// Name of the list
        #[arg(long)]
        name: String,

        #[command(flatten)]
        targets: TargetArgs,
    },
    /// Print every followed project (proto-projects first)
    Followed,
    /// Print every project list with its key
    Lists,
    /// Create a project list
    CreateList { name: String },
    /// Delete a project list
    DeleteList { name: String },
    /// Print the projects in a list
    List { name: String },
    /// Run a query on followed projects and lists
    Query {
        /// Language of the query
        #[arg(short, long)]
        lang: String,

        /// Path to the .ql query file
        #[arg(short, long)]
        query: PathBuf,

        /// Project list key to run the query on (can specify multiple)
        #[arg(long = "list-key")]
        list_keys: Vec<String>,

        /// Query every followed project
        #[arg(short = 'a', long)]
        all: bool,

        #[command(flatten)]
        targets: TargetArgs,
    },
    /// Start new build attempts for followed proto-projects
    RebuildProto {
        #[arg(short = 'e', long)]
        exclude: Vec<String>,

        /// Don't ask for each proto-project
        #[arg(short = 'F', long)]
        force: bool,
    },
    /// Build followed projects for a language
    Rebuild {
        #[arg(short, long)]
        lang: String,

        #[arg(short = 'e', long)]
        exclude: Vec<String>,

        /// Also rebuild projects that already have the language
        #[arg(long)]
        all: bool,

        /// Don't ask before rebuilding
        #[arg(short = 'F', long)]
        force: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    shutdown::setup_shutdown_handler();

    // Structured logging when not attached to a terminal
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("lgtm=info,lgtm_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(*shell)?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output.clone())?;
            return Ok(());
        }
        _ => {}
    }

    let config = config::Config::load(cli.global.conf.as_deref())?;
    let ctx = commands::shared::Context::new(&config, &cli.global)?;

    match cli.command {
        Commands::UnfollowAll => commands::unfollow::handle_unfollow_all(&ctx).await?,
        Commands::Unfollow { targets } => commands::unfollow::handle_unfollow(&ctx, targets).await?,
        Commands::Follow { targets, lang } => {
            commands::follow::handle_follow(&ctx, targets, lang.as_deref()).await?;
        }
        #[cfg(feature = "github")]
        Commands::FollowByLang { lang, exclude } => {
            commands::follow::handle_follow_by_lang(&ctx, &lang, exclude).await?;
        }
        #[cfg(feature = "github")]
        Commands::FollowBySearchMeta { query, exclude } => {
            commands::follow::handle_follow_by_search_meta(&ctx, &query, exclude).await?;
        }
        #[cfg(feature = "github")]
        Commands::FollowByCodeSearch { query, exclude } => {
            commands::follow::handle_follow_by_code_search(&ctx, &query, exclude).await?;
        }
        #[cfg(feature = "discovery")]
        Commands::FollowByImporters {
            package,
            limit,
            exclude,
        } => {
            commands::follow::handle_follow_by_importers(&ctx, &package, limit, exclude).await?;
        }
        Commands::AddToList { name, targets } => {
            commands::lists::handle_add_to_list(&ctx, &name, targets).await?;
        }
        Commands::Followed => commands::lists::handle_followed(&ctx).await?,
        Commands::Lists => commands::lists::handle_lists(&ctx).await?,
        Commands::CreateList { name } => commands::lists::handle_create_list(&ctx, &name).await?,
        Commands::DeleteList { name } => commands::lists::handle_delete_list(&ctx, &name).await?,
        Commands::List { name } => commands::lists::handle_list(&ctx, &name).await?,
        Commands::Query {
            lang,
            query,
            list_keys,
            all,
            targets,
        } => {
            let args = commands::query::QueryArgs {
                lang,
                query,
                list_keys,
                all,
                targets,
            };
            commands::query::handle_query(&ctx, args).await?;
        }
        Commands::RebuildProto { exclude, force } => {
            commands::rebuild::handle_rebuild_proto(&ctx, &exclude, force).await?;
        }
        Commands::Rebuild {
            lang,
            exclude,
            all,
            force,
        } => {
            commands::rebuild::handle_rebuild(&ctx, &lang, &exclude, all, force).await?;
        }
        Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}
