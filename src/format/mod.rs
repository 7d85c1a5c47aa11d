//! Output format module implementation

mod json;
mod csv;

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

use crate::sweep::Listing;
use crate::DisassemblyError;

/// Supported output formats for a decode session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text assembly and pseudo-code views (default)
    #[default]
    Text,
    /// JSON format (one document per session)
    Json,
    /// JSON Lines format (one JSON object per instruction)
    #[value(name = "jsonl")]
    JsonLines,
    /// CSV format (comma-separated values)
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "jsonlines" => Ok(OutputFormat::JsonLines),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl OutputFormat {
    /// Get all available output formats
    pub fn available_formats() -> &'static [Self] {
        &[
            OutputFormat::Text,
            OutputFormat::Json,
            OutputFormat::JsonLines,
            OutputFormat::Csv,
        ]
    }

    /// Get a formatter for this output format
    pub fn get_formatter(&self, view: View) -> Box<dyn ListingFormatter> {
        match self {
            OutputFormat::Text => Box::new(TextFormatter::new(view)),
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::JsonLines => Box::new(JsonLinesFormatter),
            OutputFormat::Csv => Box::new(CsvFormatter),
        }
    }
}

/// Which text views to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum View {
    /// Assembly listing only
    Asm,
    /// Pseudo-code only
    Pseudo,
    /// Assembly listing followed by pseudo-code
    #[default]
    Both,
}

impl View {
    fn shows_asm(&self) -> bool {
        matches!(self, View::Asm | View::Both)
    }

    fn shows_pseudo(&self) -> bool {
        matches!(self, View::Pseudo | View::Both)
    }
}

/// Formatter trait for session output
pub trait ListingFormatter {
    /// Format a decoded listing
    fn format(&self, listing: &Listing) -> Result<String, DisassemblyError>;
}

/// Format a session as boxed text views
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter {
    view: View,
}

/// Format a session in JSON
pub struct JsonFormatter;

/// Format a session in JSON Lines
pub struct JsonLinesFormatter;

/// Format a session in CSV
pub struct CsvFormatter;

impl TextFormatter {
    /// Create a text formatter for the given views
    pub fn new(view: View) -> Self {
        Self { view }
    }
}

/// Inner width of the banner box
const BANNER_WIDTH: usize = 63;

/// Boxed title line used above each text view, title `indent` columns in.
fn banner(title: &str, indent: usize) -> String {
    let rule = "═".repeat(BANNER_WIDTH);
    let inner = format!("{}{}", " ".repeat(indent), title);
    format!(
        "╔{rule}╗\n║{:<width$}║\n╚{rule}╝\n\n",
        inner,
        rule = rule,
        width = BANNER_WIDTH
    )
}

impl ListingFormatter for TextFormatter {
    fn format(&self, listing: &Listing) -> Result<String, DisassemblyError> {
        let mut output = String::new();

        if self.view.shows_asm() {
            output.push_str(&banner("ASSEMBLY VIEW", 20));
            for line in listing.assembly_lines() {
                output.push_str(&line);
                output.push('\n');
            }
        }

        if self.view.shows_pseudo() {
            if self.view.shows_asm() {
                output.push('\n');
            }
            output.push_str(&banner("PSEUDO-CODE VIEW", 19));
            output.push_str(&listing.pseudo_code().to_string());
        }

        Ok(output)
    }
}
