//! Command line parsing.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub file: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub check: bool,
    pub once: bool,
    pub all: bool,
    pub verbose: bool,
    pub help: bool,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CliError {
    #[error("{0} requires a file path")]
    MissingValue(String),

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("--all can only be used with --once")]
    AllWithoutOnce,
}

pub fn print_usage() {
    eprintln!("Usage: shellgrid [OPTIONS] [FILE]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  [FILE]                 Grid to run (.csv, default from config)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <FILE>    Read configuration from FILE");
    eprintln!("  --check                Report cycles and exit");
    eprintln!("  --once                 Run one build and exit");
    eprintln!("  --all                  With --once, rebuild every file producer");
    eprintln!("  -v, --verbose          Debug logging");
    eprintln!("  -h, --help             Print help");
}

/// Parse arguments, not including the program name.
pub fn parse_args<I>(args: I) -> Result<CliArgs, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => parsed.help = true,
            "-c" | "--config" => {
                let Some(path) = args.next() else {
                    return Err(CliError::MissingValue(arg.clone()));
                };
                parsed.config = Some(PathBuf::from(path));
            }
            "--check" => parsed.check = true,
            "--once" => parsed.once = true,
            "--all" => parsed.all = true,
            "-v" | "--verbose" => parsed.verbose = true,
            flag if flag.starts_with('-') && flag != "-" => {
                return Err(CliError::UnknownOption(flag.to_string()));
            }
            _ => {
                if parsed.file.is_some() {
                    return Err(CliError::UnexpectedArgument(arg.clone()));
                }
                parsed.file = Some(PathBuf::from(&arg));
            }
        }
    }

    if parsed.all && !parsed.once && !parsed.help {
        return Err(CliError::AllWithoutOnce);
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, CliError> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_no_arguments() {
        assert_eq!(parse(&[]).unwrap(), CliArgs::default());
    }

    #[test]
    fn test_file_and_flags() {
        let args = parse(&["build.csv", "--once", "--all", "-v", "--config", "my.toml"]).unwrap();
        assert_eq!(args.file, Some(PathBuf::from("build.csv")));
        assert_eq!(args.config, Some(PathBuf::from("my.toml")));
        assert!(args.once && args.all && args.verbose);
        assert!(!args.check);
    }

    #[test]
    fn test_missing_config_value() {
        assert_eq!(
            parse(&["-c"]).unwrap_err(),
            CliError::MissingValue("-c".to_string())
        );
    }

    #[test]
    fn test_rejects_unknown_and_extra() {
        assert_eq!(
            parse(&["--watch"]).unwrap_err().to_string(),
            "Unknown option: --watch"
        );
        assert_eq!(
            parse(&["a.csv", "b.csv"]).unwrap_err(),
            CliError::UnexpectedArgument("b.csv".to_string())
        );
    }

    #[test]
    fn test_all_requires_once() {
        assert_eq!(parse(&["--all"]).unwrap_err(), CliError::AllWithoutOnce);
        assert!(parse(&["--all", "--help"]).unwrap().help);
    }
}
