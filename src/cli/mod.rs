use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::wire::{AspectRatio, ImageSize, ThinkingLevel};

/// Where presets, settings, options and templates live.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The prompt studio web backend.
    Http,
    /// Files under the data directory.
    Local,
}

/// Who answers generate/modify requests.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Relay through the web backend.
    Server,
    /// Call an OpenAI-compatible endpoint directly.
    #[value(name = "openai", alias = "open-ai")]
    OpenAI,
}

#[derive(Parser, Debug)]
#[command(name = "prompt-studio", version, about = "Structured image-prompt editor with AI-assisted generation and review")]
pub struct Args {
    #[arg(long, default_value = ".")]
    pub root: String,

    /// YAML config file; defaults to <root>/prompt-studio.yaml when present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    #[arg(long, value_enum)]
    pub provider: Option<ProviderKind>,

    /// Web backend URL (also PROMPT_STUDIO_SERVER).
    #[arg(long)]
    pub server: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub timeout_secs: Option<u64>,

    #[arg(long, default_value_t = false)]
    pub save_transcript: bool,

    #[arg(long, default_value_t = false)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the prompt text a document renders to.
    Preview {
        /// Document file, or - for stdin.
        input: PathBuf,
    },
    /// Show the field-level differences between two documents.
    Diff { old: PathBuf, new: PathBuf },
    /// Apply the chosen differences from a proposed document onto a base.
    Apply {
        base: PathBuf,
        proposed: PathBuf,
        /// `all`, `none`, or entry numbers like `1,3-5`. Prompts when omitted.
        #[arg(long)]
        accept: Option<String>,
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Ask the AI for a new document from a description and/or images.
    Generate {
        description: Option<String>,
        #[command(flatten)]
        ai: AiArgs,
    },
    /// Ask the AI to change an existing document, then review the diff.
    Modify {
        input: PathBuf,
        request: String,
        #[command(flatten)]
        ai: AiArgs,
        #[arg(long)]
        accept: Option<String>,
    },
    #[command(subcommand)]
    Presets(PresetCommand),
    /// Autocomplete candidates for a field, drawn from saved presets.
    Suggest {
        /// Field name, e.g. `lighting`; see `fields`.
        field: String,
        #[arg(default_value = "")]
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List editable fields and their document paths.
    Fields,
    /// Candidate lists offered for the negative prompt.
    #[command(subcommand)]
    Options(OptionsCommand),
    /// Generate an image from a document's rendered prompt.
    Image {
        input: PathBuf,
        #[arg(long = "image", short = 'i')]
        images: Vec<PathBuf>,
        #[arg(long, value_enum, default_value = "1:1")]
        aspect_ratio: AspectRatio,
        #[arg(long, value_enum, default_value = "2K")]
        size: ImageSize,
        #[arg(long, value_enum, default_value = "low")]
        thinking_level: ThinkingLevel,
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    #[command(subcommand)]
    Config(ConfigCommand),
    #[command(subcommand)]
    LineArt(LineArtCommand),
}

#[derive(ClapArgs, Debug)]
pub struct AiArgs {
    /// Reference image (up to 3).
    #[arg(long = "image", short = 'i')]
    pub images: Vec<PathBuf>,
    /// Write the resulting document here instead of stdout.
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum PresetCommand {
    List,
    Show { name: String },
    Save { name: String, input: PathBuf },
    Delete { name: String },
    /// Rewrite every stored preset with canonical key order.
    Format,
}

#[derive(Subcommand, Debug)]
pub enum OptionsCommand {
    List,
    /// One list, e.g. `禁止元素`.
    Show { name: String },
    Add { name: String, value: String },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    Show,
    Set {
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        gemini_base_url: Option<String>,
        #[arg(long)]
        gemini_api_key: Option<String>,
        #[arg(long)]
        gemini_model: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum LineArtCommand {
    Show,
    Set { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn parser_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_modify_with_images_and_mask() {
        let args = Args::try_parse_from([
            "prompt-studio", "--backend", "local", "modify", "doc.json", "夜景", "-i", "a.png", "-i", "b.jpg", "--accept",
            "1,3",
        ])
        .unwrap();
        assert_eq!(args.backend, Some(BackendKind::Local));
        match args.command {
            Command::Modify { ai, accept, .. } => {
                assert_eq!(ai.images.len(), 2);
                assert_eq!(accept.as_deref(), Some("1,3"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn options_and_preset_maintenance_commands() {
        let args = Args::try_parse_from(["prompt-studio", "options", "add", "禁止元素", "水印"]).unwrap();
        match args.command {
            Command::Options(OptionsCommand::Add { name, value }) => {
                assert_eq!(name, "禁止元素");
                assert_eq!(value, "水印");
            }
            other => panic!("unexpected command {other:?}"),
        }
        let args = Args::try_parse_from(["prompt-studio", "presets", "format"]).unwrap();
        assert!(matches!(args.command, Command::Presets(PresetCommand::Format)));
    }

    #[test]
    fn provider_names_match_the_config_file() {
        for name in ["openai", "open-ai"] {
            let args = Args::try_parse_from(["prompt-studio", "--provider", name, "fields"]).unwrap();
            assert_eq!(args.provider, Some(ProviderKind::OpenAI));
        }
        let from_yaml: ProviderKind = serde_yaml::from_str("openai").unwrap();
        assert_eq!(from_yaml, ProviderKind::OpenAI);
    }

    #[test]
    fn image_layout_defaults() {
        let args = Args::try_parse_from(["prompt-studio", "image", "doc.json", "--aspect-ratio", "16:9"]).unwrap();
        match args.command {
            Command::Image { aspect_ratio, size, thinking_level, .. } => {
                assert_eq!(aspect_ratio, AspectRatio::Landscape16x9);
                assert_eq!(size, ImageSize::TwoK);
                assert_eq!(thinking_level, ThinkingLevel::Low);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
