use crate::cli::VerbosityLevel;
use crate::config::ConfigError;
use crate::error::{ConversionError, MigrationError};

/// Renders fatal errors on stderr with configurable verbosity
pub struct ErrorReporter {
    verbosity: VerbosityLevel,
    show_timestamps: bool,
}

impl ErrorReporter {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_timestamps: false,
        }
    }

    pub fn with_timestamps(verbosity: VerbosityLevel, show_timestamps: bool) -> Self {
        Self {
            verbosity,
            show_timestamps,
        }
    }

    /// Report an error that ended the run
    pub fn report_error(&self, error: &MigrationError) {
        eprintln!("{}", self.format_error(error));
    }

    pub fn report_config_error(&self, error: &ConfigError) {
        eprintln!("{}", self.format_config_error(error));
    }

    pub fn format_error(&self, error: &MigrationError) -> String {
        match self.verbosity {
            VerbosityLevel::Quiet => format!("ERROR: {}", error),
            VerbosityLevel::Normal => self.format_error_normal(error),
            VerbosityLevel::Verbose => self.format_error_verbose(error),
            VerbosityLevel::Debug => self.format_error_debug(error),
        }
    }

    pub fn format_config_error(&self, error: &ConfigError) -> String {
        match self.verbosity {
            VerbosityLevel::Quiet => format!("Config error: {}", error),
            VerbosityLevel::Normal | VerbosityLevel::Verbose => {
                format!("Configuration Error: {}\n{}", error, config_help(error))
            }
            VerbosityLevel::Debug => format!(
                "Configuration Error: {}\nDebug: {:?}\n{}",
                error,
                error,
                config_help(error)
            ),
        }
    }

    fn format_error_normal(&self, error: &MigrationError) -> String {
        let timestamp = if self.show_timestamps {
            format!("[{}] ", chrono::Utc::now().format("%H:%M:%S"))
        } else {
            String::new()
        };

        format!("{}{}", timestamp, error)
    }

    fn format_error_verbose(&self, error: &MigrationError) -> String {
        let mut output = self.format_error_normal(error);

        match error {
            MigrationError::Http(_) | MigrationError::Timeout { .. } => {
                output.push_str("\nSuggestion: Check that both systems are reachable");
            }
            MigrationError::HttpStatus { url, status, .. } if *status >= 500 => {
                output.push_str(&format!(
                    "\nSuggestion: {} kept failing after every retry; try again later",
                    url
                ));
            }
            MigrationError::HttpStatus { url, .. } => {
                output.push_str(&format!("\nSuggestion: Verify the base URL serves {}", url));
            }
            MigrationError::Envelope { .. } => {
                output.push_str(
                    "\nSuggestion: Check that --old-format/--new-format match what each system serves",
                );
            }
            MigrationError::Conversion(ConversionError::MissingField { field }) => {
                output.push_str(&format!("\nThe document has no '{}'", field));
            }
            MigrationError::QueueClosed { queue } => {
                output.push_str(&format!(
                    "\nThe consumer of the {} queue stopped; an earlier error is the cause",
                    queue
                ));
            }
            _ => {}
        }

        output
    }

    fn format_error_debug(&self, error: &MigrationError) -> String {
        let mut output = self.format_error_verbose(error);
        output.push_str(&format!("\nDebug Info: {:?}", error));

        output.push_str("\nError Chain:");
        let mut current_error: &dyn std::error::Error = error;
        let mut level = 0;
        while let Some(source) = current_error.source() {
            output.push_str(&format!("\n  {}: {}", level + 1, source));
            current_error = source;
            level += 1;
        }

        output
    }
}

fn config_help(error: &ConfigError) -> String {
    match error {
        ConfigError::Io(_) => "Check that the configuration file exists and is readable".to_string(),
        ConfigError::TomlParsing(_) | ConfigError::JsonParsing(_) => {
            "Check the configuration file syntax (TOML/JSON format expected)".to_string()
        }
        ConfigError::UnsupportedFormat(ext) => {
            format!("Rename the .{} file to .toml or .json", ext)
        }
        ConfigError::Environment(_) => {
            "Fix or unset the SAMPLE_MIGRATION_* variable named above".to_string()
        }
        ConfigError::Validation(_) => {
            "Both systems need a URL, e.g. --old http://old.example --new http://new.example"
                .to_string()
        }
    }
}
