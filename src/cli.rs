//! Command-line surface. Each subcommand maps onto one administration
//! screen of the backend, plus `vote`, which drives a voting link the way
//! the public ballot page does.

use std::io::{self, BufRead, Write as _};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::admin::{self, CandidateForm, ElectionForm, PhotoUpload};
use crate::api::ApiClient;
use crate::ballot::{BallotFlow, BallotPhase, format_countdown};
use crate::config::Config;
use crate::error::ApiError;
use crate::models::{Uid, datetime};
use crate::results;
use crate::session::SessionManager;
use crate::session::store::FileStore;

#[derive(Parser)]
#[command(
    name = "scrutin",
    version,
    about = "Administration and voting client for the Scrutin election backend"
)]
pub struct Cli {
    /// Print machine-readable JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session locally.
    Login {
        #[arg(long)]
        username: String,
        /// Read from SCRUTIN_PASSWORD or prompted for when omitted.
        #[arg(long)]
        password: Option<String>,
    },
    /// Revoke the refresh token and forget the local session.
    Logout,
    /// Show who is signed in.
    Whoami,
    /// Manage elections.
    Elections {
        #[command(subcommand)]
        command: ElectionCommand,
    },
    /// Manage the candidates of an election.
    Candidates {
        #[command(subcommand)]
        command: CandidateCommand,
    },
    /// Inspect and prune the voter roster.
    Voters {
        #[command(subcommand)]
        command: VoterCommand,
    },
    /// Create and distribute voting tokens.
    Tokens {
        #[command(subcommand)]
        command: TokenCommand,
    },
    /// Show live results for an election.
    Results {
        election: Uid,
        /// Keep refetching until interrupted.
        #[arg(long)]
        watch: bool,
        /// Seconds between refetches.
        #[arg(long, default_value_t = 10)]
        interval: u64,
    },
    /// Participation overview across all elections.
    Stats,
    /// Drive a voting link: inspect the ballot and optionally cast it.
    Vote {
        election: Uid,
        token: String,
        /// Candidate to vote for; without it the ballot is only displayed.
        #[arg(long)]
        candidate: Option<Uid>,
        /// If the election has not opened yet, wait for the start with a
        /// countdown instead of exiting.
        #[arg(long)]
        wait: bool,
    },
}

#[derive(Subcommand)]
enum ElectionCommand {
    List,
    Create(ElectionArgs),
    /// Replace title and voting window of an existing election.
    Update {
        election: Uid,
        #[command(flatten)]
        form: ElectionArgs,
    },
    Delete {
        election: Uid,
    },
    /// Open the voting window now.
    Start {
        election: Uid,
    },
    /// Close the voting window now.
    Stop {
        election: Uid,
    },
}

#[derive(Args)]
struct ElectionArgs {
    #[arg(long)]
    title: String,
    /// Start of the voting window, e.g. "2031-05-01 08:00:00".
    #[arg(long)]
    start: String,
    /// End of the voting window.
    #[arg(long)]
    end: String,
}

impl ElectionArgs {
    fn into_form(self) -> Result<ElectionForm, ApiError> {
        Ok(ElectionForm {
            title: self.title,
            start_at: parse_datetime(&self.start)?,
            end_at: parse_datetime(&self.end)?,
        })
    }
}

#[derive(Subcommand)]
enum CandidateCommand {
    List {
        election: Uid,
    },
    Add {
        election: Uid,
        #[arg(long)]
        name: String,
        #[arg(long)]
        prenom: String,
        /// Portrait file to upload with the candidate.
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    Delete {
        election: Uid,
        candidate: Uid,
    },
}

#[derive(Subcommand)]
enum VoterCommand {
    List {
        election: Uid,
    },
    /// Remove one roster entry by its e-mail (or phone) identifier.
    Delete {
        election: Uid,
        identifier: String,
    },
    /// Print a starter CSV for the roster import.
    Template,
}

#[derive(Subcommand)]
enum TokenCommand {
    /// Create tokens in bulk from a roster CSV.
    Import {
        election: Uid,
        file: PathBuf,
    },
    /// Create a single token for an e-mail address or a phone number.
    Add {
        election: Uid,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Mail tokens to the roster.
    Send {
        election: Uid,
        /// Also re-mail voters that were already contacted.
        #[arg(long)]
        all: bool,
    },
}

pub async fn run() -> Result<(), ApiError> {
    let cli = Cli::parse();
    let config = Config::load();
    let api = Arc::new(ApiClient::from_config(&config)?);

    match cli.command {
        Command::Vote {
            election,
            token,
            candidate,
            wait,
        } => vote(api, election, token, candidate, wait, cli.json).await,
        command => {
            let store = Arc::new(FileStore::new(config.session_file.clone()));
            let session = SessionManager::new(api, store)?;
            admin_command(&session, command, cli.json).await
        }
    }
}

async fn admin_command(
    session: &SessionManager,
    command: Command,
    json: bool,
) -> Result<(), ApiError> {
    match command {
        Command::Login { username, password } => {
            let password = resolve_password(password)?;
            session.login(&username, &password).await?;
            println!("logged in as {}", session.identity().await);
        }
        Command::Logout => {
            session.logout().await?;
            println!("logged out");
        }
        Command::Whoami => {
            let authenticated = session.is_authenticated().await;
            let identity = session.identity().await;
            if json {
                print_json(&serde_json::json!({
                    "authenticated": authenticated,
                    "identity": identity,
                }))?;
            } else if authenticated {
                println!("{identity}");
            } else {
                println!("not signed in");
            }
        }
        Command::Elections { command } => elections(session, command, json).await?,
        Command::Candidates { command } => candidates(session, command, json).await?,
        Command::Voters { command } => voters(session, command, json).await?,
        Command::Tokens { command } => tokens(session, command, json).await?,
        Command::Results {
            election,
            watch,
            interval,
        } => {
            show_results(session, &election, json).await?;
            while watch {
                tokio::time::sleep(std::time::Duration::from_secs(interval.max(1))).await;
                show_results(session, &election, json).await?;
            }
        }
        Command::Stats => {
            let rows = admin::stats(session).await?;
            if json {
                print_json(&rows)?;
            } else {
                for row in &rows {
                    println!(
                        "{:<12} voters {:>5}  tokens {:>5}  cast {:>5}  candidates {:>3}  participation {:>5.1}%",
                        row.election_uid,
                        row.total_voters,
                        row.total_tokens,
                        row.votes_cast,
                        row.total_candidates,
                        row.participation_rate
                    );
                }
            }
        }
        Command::Vote { .. } => unreachable!("vote is dispatched before session setup"),
    }
    Ok(())
}

async fn elections(
    session: &SessionManager,
    command: ElectionCommand,
    json: bool,
) -> Result<(), ApiError> {
    match command {
        ElectionCommand::List => {
            let elections = admin::list_elections(session).await?;
            if json {
                return print_json(&elections);
            }
            let now = Utc::now();
            for election in &elections {
                println!(
                    "{:<12} {:<32} {}  ..  {}  [{}]",
                    election.uid,
                    election.title,
                    datetime::format_backend(&election.start_at),
                    datetime::format_backend(&election.end_at),
                    election.status_at(now)
                );
            }
        }
        ElectionCommand::Create(args) => {
            admin::create_election(session, &args.into_form()?).await?;
            println!("election created");
        }
        ElectionCommand::Update { election, form } => {
            admin::update_election(session, &election, &form.into_form()?).await?;
            println!("election updated");
        }
        ElectionCommand::Delete { election } => {
            admin::delete_election(session, &election).await?;
            println!("election deleted");
        }
        ElectionCommand::Start { election } => {
            admin::start_election(session, &election).await?;
            println!("election started");
        }
        ElectionCommand::Stop { election } => {
            admin::stop_election(session, &election).await?;
            println!("election stopped");
        }
    }
    Ok(())
}

async fn candidates(
    session: &SessionManager,
    command: CandidateCommand,
    json: bool,
) -> Result<(), ApiError> {
    match command {
        CandidateCommand::List { election } => {
            let candidates = admin::list_candidates(session, &election).await?;
            if json {
                return print_json(&candidates);
            }
            for candidate in &candidates {
                println!("{:<12} {}", candidate.id, candidate.full_name());
            }
        }
        CandidateCommand::Add {
            election,
            name,
            prenom,
            photo,
        } => {
            let photo = photo
                .map(|path| -> Result<PhotoUpload, ApiError> {
                    Ok(PhotoUpload {
                        file_name: file_name_of(&path, "photo"),
                        bytes: std::fs::read(&path)?,
                    })
                })
                .transpose()?;
            let form = CandidateForm {
                name,
                prenom,
                photo,
            };
            admin::add_candidate(session, &election, &form).await?;
            println!("candidate added");
        }
        CandidateCommand::Delete {
            election,
            candidate,
        } => {
            admin::delete_candidate(session, &election, &candidate).await?;
            println!("candidate removed");
        }
    }
    Ok(())
}

async fn voters(
    session: &SessionManager,
    command: VoterCommand,
    json: bool,
) -> Result<(), ApiError> {
    match command {
        VoterCommand::List { election } => {
            let voters = admin::list_votants(session, &election).await?;
            if json {
                return print_json(&voters);
            }
            for voter in &voters {
                println!(
                    "{:<32} {:<9} {}",
                    voter.email,
                    if voter.is_active { "not voted" } else { "voted" },
                    if voter.mailed { "mailed" } else { "" }
                );
            }
        }
        VoterCommand::Delete {
            election,
            identifier,
        } => {
            admin::delete_votant(session, &election, &identifier).await?;
            println!("voter removed");
        }
        VoterCommand::Template => println!("{}", admin::CSV_TEMPLATE),
    }
    Ok(())
}

async fn tokens(
    session: &SessionManager,
    command: TokenCommand,
    json: bool,
) -> Result<(), ApiError> {
    match command {
        TokenCommand::Import { election, file } => {
            let bytes = std::fs::read(&file)?;
            let name = file_name_of(&file, "voters.csv");
            let report = admin::import_tokens_csv(session, &election, &name, bytes).await?;
            if json {
                print_json(&report)?;
            } else {
                println!("{} tokens created", report.count());
            }
        }
        TokenCommand::Add {
            election,
            email,
            phone,
        } => match (email, phone) {
            (Some(email), None) => {
                admin::create_token_email(session, &election, &email).await?;
                println!("token created for {email}");
            }
            (None, Some(phone)) => {
                admin::create_token_phone(session, &election, &phone).await?;
                println!("token created for {phone}");
            }
            _ => {
                return Err(ApiError::Validation(
                    "pass exactly one of --email or --phone".into(),
                ));
            }
        },
        TokenCommand::Send { election, all } => {
            let report = if all {
                admin::send_tokens_all(session, &election).await?
            } else {
                admin::send_tokens(session, &election).await?
            };
            if json {
                print_json(&report)?;
            } else {
                println!("{} tokens sent", report.count());
            }
        }
    }
    Ok(())
}

async fn show_results(
    session: &SessionManager,
    election: &Uid,
    json: bool,
) -> Result<(), ApiError> {
    let data = admin::results(session, election).await?;
    let table = results::standings(&data.results);
    if json {
        return print_json(&table);
    }
    if let Some(election) = &data.election {
        println!("results for {}", election.title);
    }
    match results::leaders(&table).as_slice() {
        [] => println!("no votes cast yet"),
        [only] => println!("leading: {}", only.row.full_name()),
        tied => {
            let names: Vec<String> = tied.iter().map(|s| s.row.full_name()).collect();
            println!("ex aequo: {}", names.join(", "));
        }
    }
    for standing in &table {
        println!(
            "{:>3}{} {:<32} {:>6}  {:>5.1}%",
            standing.rank,
            if standing.ex_aequo { "=" } else { " " },
            standing.row.full_name(),
            standing.row.vote_count,
            standing.percent
        );
    }
    Ok(())
}

async fn vote(
    api: Arc<ApiClient>,
    election: Uid,
    token: String,
    candidate: Option<Uid>,
    wait: bool,
    json: bool,
) -> Result<(), ApiError> {
    let mut flow = BallotFlow::new(api, election, token);
    flow.load().await;

    if wait {
        if let BallotPhase::NotStarted { opens_at } = flow.phase() {
            println!("voting opens at {}", datetime::format_backend(opens_at));
            flow.wait_until_open(|remaining| {
                print!("\ropens in {}  ", format_countdown(remaining));
                let _ = io::stdout().flush();
            })
            .await;
            println!();
        }
    }

    let phase = *flow.phase();
    match phase {
        BallotPhase::Ready => {
            if json {
                print_json(&flow.candidates())?;
            } else {
                for candidate in flow.candidates() {
                    match &candidate.description {
                        Some(text) => println!(
                            "{:<12} {:<32} {text}",
                            candidate.id,
                            candidate.full_name()
                        ),
                        None => println!("{:<12} {}", candidate.id, candidate.full_name()),
                    }
                }
            }
            let Some(choice) = candidate else {
                println!("pass --candidate <id> to cast this ballot");
                return Ok(());
            };
            flow.select(choice)?;
            match flow.submit().await? {
                BallotPhase::Success => println!("ballot cast"),
                other => report_phase(other),
            }
        }
        other => report_phase(&other),
    }
    Ok(())
}

fn report_phase(phase: &BallotPhase) {
    match phase {
        BallotPhase::NotStarted { opens_at } => println!(
            "voting has not started, opens at {} (in {})",
            datetime::format_backend(opens_at),
            format_countdown(*opens_at - Utc::now())
        ),
        BallotPhase::Ended => println!("voting has ended"),
        BallotPhase::AlreadyVoted => println!("a ballot was already cast with this token"),
        BallotPhase::Invalid => println!("this voting link is not valid"),
        BallotPhase::Success => println!("ballot cast"),
        BallotPhase::Ready | BallotPhase::Loading => {}
    }
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    datetime::parse(raw).ok_or_else(|| {
        ApiError::Validation(format!(
            "could not parse `{raw}`, expected e.g. 2031-05-01 08:00:00"
        ))
    })
}

fn resolve_password(flag: Option<String>) -> Result<String, ApiError> {
    if let Some(password) = flag {
        return Ok(password);
    }
    if let Ok(password) = std::env::var("SCRUTIN_PASSWORD") {
        if !password.is_empty() {
            return Ok(password);
        }
    }
    eprint!("password: ");
    let _ = io::stderr().flush();
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(ApiError::Validation("a password is required".into()));
    }
    Ok(password)
}

fn file_name_of(path: &std::path::Path, fallback: &str) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| fallback.to_string())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), ApiError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
