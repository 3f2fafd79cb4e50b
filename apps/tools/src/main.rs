use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use round_engine::format_times;
use shared::domain::{ResultId, RoundResult};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/game_results.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print recorded rounds, best average first.
    Leaderboard {
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Print one recorded round with its per-click differences.
    Show { result_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Leaderboard { limit } => {
            let results = storage.list_results_by_average(limit).await?;
            print_board(&results);
        }
        Command::Show { result_id } => {
            let Some(result) = storage.load_result(ResultId(result_id)).await? else {
                bail!("no round result with id {result_id}");
            };
            println!(
                "#{} on {}: average {:.3}s",
                result.id.0,
                result.created_at.format("%Y-%m-%d %H:%M:%S"),
                result.average_difference
            );
            println!("targets: {}", format_times(&result.targets));
            println!("actuals: {}", format_times(&result.actuals));
            let differences: Vec<f64> = result
                .targets
                .iter()
                .zip(&result.actuals)
                .map(|(target, actual)| (actual - target).abs())
                .collect();
            println!("diffs:   {}", format_times(&differences));
        }
    }

    Ok(())
}

fn print_board(results: &[RoundResult]) {
    if results.is_empty() {
        println!("no results recorded yet");
        return;
    }
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:>3}. {:.3}s avg  (#{} on {})",
            rank + 1,
            result.average_difference,
            result.id.0,
            result.created_at.format("%Y-%m-%d %H:%M")
        );
    }
}
