use clap::Parser;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

use crate::output::Overwrite;

#[derive(Parser, Debug)]
#[command(name = "unstfs")]
#[command(version)]
#[command(about = "Extract Xbox 360 LIVE/PIRS/CON containers", long_about = None)]
#[command(after_help = "Examples:\n  \
  unstfs TU_12345.bin             extract metadata, icons and files into the current directory\n  \
  unstfs -d out -o savegame       extract into out/, replacing earlier results\n  \
  unstfs -n -q theme.con          only write what does not exist yet, warnings only")]
pub struct Cli {
    /// Container file (LIVE, PIRS, CON, FMIM or XUIZ)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Extract files into exdir (default: current directory)
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<PathBuf>,

    /// Never overwrite existing files
    #[arg(short = 'n', conflicts_with = "overwrite")]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Verbose mode (-vv => more verbose)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn overwrite_policy(&self) -> Overwrite {
        if self.overwrite {
            Overwrite::Always
        } else if self.never_overwrite {
            Overwrite::Never
        } else {
            Overwrite::Prompt
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.extract_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Artifact names are derived from the input's file name.
    pub fn basename(&self) -> String {
        self.file
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string())
    }

    pub fn log_level(&self) -> LevelFilter {
        match (self.quiet, self.verbose) {
            (0, 0) => LevelFilter::INFO,
            (0, 1) => LevelFilter::DEBUG,
            (0, _) => LevelFilter::TRACE,
            (1, _) => LevelFilter::WARN,
            _ => LevelFilter::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_input() {
        assert!(Cli::try_parse_from(["unstfs"]).is_err());
        assert!(Cli::try_parse_from(["unstfs", "a.bin", "b.bin"]).is_err());

        let cli = Cli::try_parse_from(["unstfs", "dir/TU_1.bin"]).unwrap();
        assert_eq!(cli.basename(), "TU_1.bin");
        assert_eq!(cli.output_dir(), PathBuf::from("."));
        assert_eq!(cli.overwrite_policy(), Overwrite::Prompt);
        assert_eq!(cli.log_level(), LevelFilter::INFO);
    }

    #[test]
    fn flags() {
        let cli = Cli::try_parse_from(["unstfs", "-o", "-qq", "-d", "out", "x"]).unwrap();
        assert_eq!(cli.overwrite_policy(), Overwrite::Always);
        assert_eq!(cli.log_level(), LevelFilter::ERROR);
        assert_eq!(cli.output_dir(), PathBuf::from("out"));

        let cli = Cli::try_parse_from(["unstfs", "-n", "-v", "x"]).unwrap();
        assert_eq!(cli.overwrite_policy(), Overwrite::Never);
        assert_eq!(cli.log_level(), LevelFilter::DEBUG);

        assert!(Cli::try_parse_from(["unstfs", "-n", "-o", "x"]).is_err());
    }
}
