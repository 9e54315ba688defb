use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "quant-signal")]
#[command(about = "Per-ticker BUY/HOLD/SELL signals from a self-evolving model")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Run one self-evolution step and exit
    #[arg(long)]
    pub evolve: bool,

    /// Years of price history to train on
    #[arg(long, global = true)]
    pub years: Option<u32>,

    /// Directory holding evolution state, trade ledger and batch results
    #[arg(long, global = true, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Analyse a single ticker and print the result as JSON
    Analyze {
        #[arg(long)]
        ticker: String,

        /// Company name, used to widen the news search
        #[arg(long, default_value = "")]
        name: String,

        /// Do not append the decision to the trade ledger
        #[arg(long)]
        no_record: bool,
    },
    /// Run one self-evolution step
    Evolve,
    /// Fill in the realised return of the latest pending trade for a ticker
    Settle {
        #[arg(long)]
        ticker: String,

        #[arg(long, allow_negative_numbers = true)]
        actual_return: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_command_is_batch() {
        let cli = Cli::try_parse_from(["quant-signal"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.evolve);

        let cli = Cli::try_parse_from(["quant-signal", "--evolve"]).unwrap();
        assert!(cli.evolve);
    }

    #[test]
    fn test_analyze_arguments() {
        let cli = Cli::try_parse_from([
            "quant-signal",
            "analyze",
            "--ticker",
            "AAPL",
            "--name",
            "Apple",
            "--years",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.years, Some(2));
        assert_eq!(
            cli.command,
            Some(Command::Analyze {
                ticker: "AAPL".into(),
                name: "Apple".into(),
                no_record: false,
            })
        );
    }

    #[test]
    fn test_settle_accepts_negative_return() {
        let cli = Cli::try_parse_from(["quant-signal", "settle", "--ticker", "AAPL", "--actual-return", "-0.02"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Settle {
                ticker: "AAPL".into(),
                actual_return: -0.02,
            })
        );
    }

    #[test]
    fn test_analyze_requires_ticker() {
        assert!(Cli::try_parse_from(["quant-signal", "analyze"]).is_err());
    }
}
