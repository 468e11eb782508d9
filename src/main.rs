use std::sync::Arc;

use async_std::task;
use clap::{Parser, Subcommand};
use log::*;

use livepoll::admin::{duration_from_minutes, AdminConsole, PollDraft, RESET_WARNING};
use livepoll::config::Config;
use livepoll::ledger::PollLedger;
use livepoll::models::Identity;
use livepoll::remote::http::HttpPollService;
use livepoll::remote::PollService;
use livepoll::routes;
use livepoll::time::{Clock, SystemClock};
use livepoll::widget::LivePoll;

#[derive(Debug, Parser)]
#[command(name = "livepoll", version, about = "Follow, vote in and manage the live poll")]
struct Cli {
    /// Base URL of the poll service, overrides LIVEPOLL_SERVICE_URL
    #[arg(long, global = true)]
    service_url: Option<String>,

    /// Principal to act as, overrides LIVEPOLL_PRINCIPAL
    #[arg(long, global = true)]
    principal: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the in-memory development gateway
    Serve {
        #[arg(long)]
        bind: Option<String>,
        /// Principal allowed to manage the poll, may be repeated
        #[arg(long = "admin")]
        admins: Vec<String>,
    },
    /// Follow the poll and log every change
    Watch {
        #[arg(long)]
        admin: bool,
    },
    Vote {
        candidate: String,
    },
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Debug, Subcommand)]
enum AdminAction {
    /// Create the poll, or replace the current definition
    Create {
        #[arg(long = "candidate", required = true)]
        candidates: Vec<String>,
        /// Leave out for a poll that runs until reset
        #[arg(long)]
        minutes: Option<i64>,
    },
    /// Delete the poll and every vote
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

fn connect(config: &Config) -> livepoll::Result<Arc<dyn PollService>> {
    let service = HttpPollService::new(&config.service_url, config.identity.clone())?;
    Ok(Arc::new(service))
}

async fn serve(config: Config) -> livepoll::Result<()> {
    let ledger = PollLedger::new(Arc::new(SystemClock), config.admins.iter().cloned());
    info!("Development gateway listening on {}", config.bind);
    routes::app(ledger).listen(config.bind).await?;
    Ok(())
}

async fn watch(config: Config, is_admin: bool) -> livepoll::Result<()> {
    let service = connect(&config)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut live = LivePoll::new(service, config.identity.clone(), is_admin, clock, &config.sync);

    live.mount();
    let mut last = String::new();
    loop {
        let view = live.render().await.to_string();
        if view != last {
            info!("{}", view);
            last = view;
        }
        task::sleep(config.sync.countdown_tick).await;
    }
}

async fn vote(config: Config, candidate: &str) -> livepoll::Result<()> {
    let service = connect(&config)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut live = LivePoll::new(service, config.identity.clone(), false, clock, &config.sync);

    live.refresh().await;
    let outcome = live.vote(candidate).await;
    live.unmount().await;

    match outcome {
        Ok(receipt) => {
            println!("Your vote for {} has been recorded!", receipt.candidate);
            Ok(())
        }
        Err(failure) => {
            println!("{}", failure.message());
            if failure.prompt_login() {
                println!("Pass --principal or set LIVEPOLL_PRINCIPAL to vote.");
            }
            Err(failure.into())
        }
    }
}

async fn admin(config: Config, action: AdminAction) -> livepoll::Result<()> {
    let console = AdminConsole::new(connect(&config)?, Arc::new(SystemClock), vec![]);

    match action {
        AdminAction::Create { candidates, minutes } => {
            let draft = PollDraft {
                candidates,
                duration: minutes.map(duration_from_minutes).transpose()?,
            };
            let definition = console.create_or_update_poll(draft).await?;
            println!(
                "Poll created/updated successfully with {} candidate(s)!",
                definition.candidates.len()
            );
        }
        AdminAction::Reset { yes: false } => {
            println!("{}", RESET_WARNING);
            println!("Re-run with --yes to reset the poll.");
        }
        AdminAction::Reset { yes: true } => {
            console.request_reset().confirm().await?;
            println!("Poll reset successfully!");
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> livepoll::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(url) = cli.service_url {
        config.service_url = url;
    }
    if cli.principal.is_some() {
        config.identity = Identity::from_principal(cli.principal);
    }

    match cli.command {
        Command::Serve { bind, admins } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            config.admins.extend(admins);
            serve(config).await
        }
        Command::Watch { admin } => watch(config, admin).await,
        Command::Vote { candidate } => vote(config, &candidate).await,
        Command::Admin { action } => admin(config, action).await,
    }
}

#[async_std::main]
async fn main() {
    pretty_env_logger::init();

    if let Err(err) = run(Cli::parse()).await {
        error!("{}", err);
        std::process::exit(1);
    }
}
