//! D21 CLI - Command Line Interface

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use d21_cli::{format_remaining, parse_address, ApiClient};
use d21_core::SubjectId;
use d21_election::Polarity;

#[derive(Parser)]
#[command(name = "d21")]
#[command(about = "D21 - Janecek method voting CLI")]
#[command(version)]
struct Cli {
    /// Node URL
    #[arg(short, long, default_value = "http://127.0.0.1:8021")]
    node: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum VoteKind {
    Positive,
    Negative,
}

impl From<VoteKind> for Polarity {
    fn from(kind: VoteKind) -> Self {
        match kind {
            VoteKind::Positive => Polarity::Positive,
            VoteKind::Negative => Polarity::Negative,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Node status
    Status,

    /// Create an election
    Create {
        /// Administrator address (hex)
        #[arg(short, long)]
        admin: String,

        /// Voting window in seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// List elections
    Elections,

    /// Show election details
    Info {
        /// Election ID
        election: String,
    },

    /// List subjects of an election
    Subjects {
        /// Election ID
        election: String,
    },

    /// Register a subject
    AddSubject {
        /// Election ID
        election: String,

        /// Subject name
        name: String,
    },

    /// Register a voter
    AddVoter {
        /// Election ID
        election: String,

        /// Administrator address (hex)
        #[arg(short, long)]
        admin: String,

        /// Voter address (hex)
        voter: String,
    },

    /// Cast a vote
    Vote {
        /// Election ID
        election: String,

        /// Voter address (hex)
        #[arg(short, long)]
        from: String,

        /// Subject ID
        subject: u32,

        /// Vote polarity
        #[arg(short, long, value_enum, default_value = "positive")]
        kind: VoteKind,
    },

    /// Subjects a voter has voted for
    Voted {
        /// Election ID
        election: String,

        /// Voter address (hex)
        voter: String,
    },

    /// Check whether an address may vote
    Eligible {
        /// Election ID
        election: String,

        /// Voter address (hex)
        voter: String,
    },

    /// Remaining voting time
    Remaining {
        /// Election ID
        election: String,
    },

    /// Current results
    Results {
        /// Election ID
        election: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let api = ApiClient::new(&cli.node)?;

    match cli.command {
        Commands::Status => {
            let status = api.status().await?;
            println!("{}", "D21 Node Status".bold());
            println!("===============");
            println!("Name:           {}", status.name);
            println!("Elections:      {}", status.elections);
            println!("Open Elections: {}", status.open_elections);
            println!("Votes Cast:     {}", status.votes_cast);
        }

        Commands::Create { admin, duration } => {
            let admin = parse_address(&admin)?;
            let info = api.create_election(&admin, duration).await?;
            println!("{} Election created!", "OK".green().bold());
            println!("ID:       {}", info.id);
            println!("Deadline: {}", info.deadline);
        }

        Commands::Elections => {
            let elections = api.elections().await?;

            if elections.is_empty() {
                println!("No elections found.");
            } else {
                println!("{:<38} {:<8} {:>8} {:>8}", "ID", "State", "Subjects", "Voters");
                println!("{:-<38} {:-<8} {:->8} {:->8}", "", "", "", "");
                for e in elections {
                    let state = if e.closed { "closed".red() } else { "open".green() };
                    println!(
                        "{:<38} {:<8} {:>8} {:>8}",
                        e.id, state, e.subject_count, e.voter_count
                    );
                }
            }
        }

        Commands::Info { election } => {
            let info = api.election(&election).await?;
            println!("Election:      {}", info.id);
            println!("Administrator: {}", info.administrator);
            println!("Created:       {}", info.created_at);
            println!("Deadline:      {}", info.deadline);
            println!("Remaining:     {}", format_remaining(info.remaining_secs));
            println!("Subjects:      {}", info.subject_count);
            println!("Voters:        {}", info.voter_count);
            println!("Version:       {}", info.version);
        }

        Commands::Subjects { election } => {
            let ids = api.subjects(&election).await?;

            if ids.is_empty() {
                println!("No subjects registered.");
            } else {
                println!("{:<6} {:<32} {:>6}", "ID", "Name", "Score");
                println!("{:-<6} {:-<32} {:->6}", "", "", "");
                for id in ids {
                    let subject = api.subject(&election, SubjectId::new(id)).await?;
                    println!("{:<6} {:<32} {:>6}", subject.id, subject.name, subject.score);
                }
            }
        }

        Commands::AddSubject { election, name } => {
            let subject = api.register_subject(&election, &name).await?;
            println!(
                "{} Subject '{}' registered with ID {}",
                "OK".green().bold(),
                subject.name,
                subject.id
            );
        }

        Commands::AddVoter {
            election,
            admin,
            voter,
        } => {
            let admin = parse_address(&admin)?;
            let voter = parse_address(&voter)?;
            let info = api.register_voter(&election, &admin, &voter).await?;
            println!("{} Voter {} registered", "OK".green().bold(), info.address);
        }

        Commands::Vote {
            election,
            from,
            subject,
            kind,
        } => {
            let voter = parse_address(&from)?;
            let receipt = api
                .cast_vote(&election, &voter, SubjectId::new(subject), kind.into())
                .await?;
            println!(
                "{} Vote for subject {} recorded as {:?}",
                "OK".green().bold(),
                receipt.subject_id,
                receipt.slot
            );
        }

        Commands::Voted { election, voter } => {
            let voter = parse_address(&voter)?;
            let voted = api.voted_subjects(&election, &voter).await?;

            if voted.is_empty() {
                println!("No votes cast.");
            } else {
                let list: Vec<String> = voted.iter().map(|id| id.to_string()).collect();
                println!("Voted for: {}", list.join(", "));
            }
        }

        Commands::Eligible { election, voter } => {
            let voter = parse_address(&voter)?;
            let info = api.voter(&election, &voter).await?;

            if info.eligible {
                println!("{} {} is a registered voter", "Yes".green().bold(), info.address);
                if let Some(stage) = info.stage {
                    println!("Stage: {:?}", stage);
                    if stage.is_exhausted() {
                        println!("{}", "No votes left".yellow());
                    }
                }
            } else {
                println!("{} {} is not registered", "No".red().bold(), info.address);
            }
        }

        Commands::Remaining { election } => {
            let remaining = api.remaining(&election).await?;
            if remaining.remaining_ms == 0 {
                println!("Voting closed at {}", remaining.deadline);
            } else {
                println!(
                    "{} left (closes {})",
                    format_remaining(remaining.remaining_secs),
                    remaining.deadline
                );
            }
        }

        Commands::Results { election } => {
            let results = api.results(&election).await?;

            if results.provisional {
                println!("{}", "Provisional results, voting still open".yellow());
            }
            println!("{:<4} {:<32} {:>6}", "#", "Subject", "Score");
            println!("{:-<4} {:-<32} {:->6}", "", "", "");
            for (rank, standing) in results.results.iter().enumerate() {
                println!("{:<4} {:<32} {:>6}", rank + 1, standing.name, standing.score);
            }
        }
    }

    Ok(())
}
