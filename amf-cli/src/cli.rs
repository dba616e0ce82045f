use amf::AmfVersion;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "amfdump",
    about = "amfdump - inspect and produce AMF0/AMF3 payloads",
    version
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Largest allocation a length prefix may request, in bytes
    #[arg(long, global = true)]
    pub max_allocation: Option<usize>,

    /// Fail on class names with no registered type instead of decoding them as bags
    #[arg(long, global = true)]
    pub strict: bool,

    /// Format of the log lines written to stderr
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode every value in a payload
    Decode {
        /// Payload file, raw bytes unless --hex is given
        file: PathBuf,

        /// The file holds hex text
        #[arg(long)]
        hex: bool,

        /// Encoding of the payload
        #[arg(long, value_enum)]
        version: Option<Version>,

        /// Output format
        #[arg(short, long, default_value = "json")]
        output: OutputFormat,
    },

    /// Encode a JSON document as one value
    Encode {
        /// JSON text, or @path to read it from a file
        json: String,

        /// Encoding to produce
        #[arg(long, value_enum)]
        version: Option<Version>,

        /// Print hex instead of raw bytes
        #[arg(long)]
        hex: bool,

        /// Write the payload to a file
        #[arg(short = 'O', long)]
        output_file: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Version {
    Amf0,
    Amf3,
}

impl From<Version> for AmfVersion {
    fn from(value: Version) -> Self {
        match value {
            Version::Amf0 => AmfVersion::Amf0,
            Version::Amf3 => AmfVersion::Amf3,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON, pretty-printed when the configuration asks for it
    #[default]
    Json,
    /// One JSON document per line
    JsonCompact,
    /// Rust debug representation of the decoded values
    Debug,
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decode() {
        let args = Args::try_parse_from([
            "amfdump",
            "decode",
            "payload.bin",
            "--hex",
            "--version",
            "amf0",
            "-o",
            "debug",
            "--strict",
        ])
        .unwrap();

        assert!(args.strict);
        match args.command {
            Commands::Decode {
                file,
                hex,
                version,
                output,
            } => {
                assert_eq!(file, PathBuf::from("payload.bin"));
                assert!(hex);
                assert_eq!(version, Some(Version::Amf0));
                assert_eq!(output, OutputFormat::Debug);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_encode_with_globals() {
        let args = Args::try_parse_from([
            "amfdump",
            "--max-allocation",
            "1024",
            "encode",
            "{\"a\":1}",
            "--hex",
        ])
        .unwrap();

        assert_eq!(args.max_allocation, Some(1024));
        assert_eq!(args.log_format, LogFormat::Text);
        assert!(matches!(args.command, Commands::Encode { hex: true, version: None, .. }));
    }

    #[test]
    fn test_parse_log_format() {
        let args =
            Args::try_parse_from(["amfdump", "decode", "x", "--log-format", "json"]).unwrap();
        assert_eq!(args.log_format, LogFormat::Json);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Args::try_parse_from(["amfdump", "-v", "-q", "decode", "x"]).is_err());
    }
}
