use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};

use texgen_client::api::{DEFAULT_PAGE, DEFAULT_PAGE_LIMIT};
use texgen_core::resolution::Resolution;

/// Generate, refine and download seamless textures.
#[derive(Parser)]
#[command(name = "texgen", version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate previews, optionally refine them, then finalize.
    Generate {
        #[arg(long, default_value = "")]
        prompt: String,
        /// Reference image; repeat for several.
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// 1-based variation to keep.
        #[arg(long)]
        select: Option<usize>,
        /// Modification prompt; applied in order.
        #[arg(long = "modify")]
        modifications: Vec<String>,
        /// Upscale to this resolution (`2K`, `4096`, ...).
        #[arg(long, value_parser = parse_resolution)]
        finalize: Option<Resolution>,
        /// Download the final texture here (file or directory).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Download a finished texture.
    Download {
        job_id: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List public textures.
    Gallery {
        #[arg(long, default_value_t = DEFAULT_PAGE)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: u32,
    },
    /// List your finalized textures.
    Mine,
    /// Publish or unpublish one of your textures.
    #[command(group(ArgGroup::new("visibility").required(true).args(["public", "private"])))]
    Visibility {
        job_id: String,
        #[arg(long)]
        public: bool,
        #[arg(long)]
        private: bool,
    },
    /// Show the signed-in account.
    Whoami,
    /// Create an account from TEXGEN_EMAIL / TEXGEN_PASSWORD.
    Register {
        #[arg(long)]
        name: String,
    },
}

/// Accepts pixel sizes (`4096`, `512px`) and K labels (`4K`).
pub(crate) fn parse_resolution(raw: &str) -> Result<Resolution, String> {
    let lower = raw.trim().to_ascii_lowercase();
    let pixels = match lower.strip_suffix('k') {
        Some(k) => k.parse::<u32>().map(|k| k.saturating_mul(1024)),
        None => lower.trim_end_matches("px").parse::<u32>(),
    }
    .map_err(|_| format!("'{raw}' is not a resolution"))?;
    Resolution::new(pixels).map_err(|e| e.to_string())
}
