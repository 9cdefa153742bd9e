use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use wheelwright_core::{BackendKind, DEFAULT_CATALOG};
use wheelwright_domain::{PlatformSelector, RuntimeSpec, VariantSelector, VersionSuffix};

pub const WHEELWRIGHT_BEFORE_HELP: &str = concat!(
    "wheelwright ",
    env!("CARGO_PKG_VERSION"),
    " - build-matrix release orchestration for binary wheels\n\n",
    "\x1b[1;36mPipeline\x1b[0m\n",
    "  release          Plan, build, verify, publish and release a build matrix.\n\n",
    "\x1b[1;36mWheel tools\x1b[0m\n",
    "  verify           Check wheels for structural integrity.\n",
    "  set-description  Replace a wheel's long description.\n",
    "  add-suffix       Re-version a wheel with a .postN/.devN suffix.\n",
    "  organize         Sort a dist directory into {dist}-{version}/python-X.Y/.\n",
);

#[derive(Parser, Debug)]
#[command(
    name = "wheelwright",
    author,
    version,
    disable_help_subcommand = true,
    before_help = WHEELWRIGHT_BEFORE_HELP
)]
#[allow(clippy::struct_excessive_bools)]
pub struct WheelwrightCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(about = "Plan, build, verify, publish and release a build matrix")]
    Release(ReleaseArgs),
    #[command(about = "Check wheels (or directories of wheels) for structural integrity")]
    Verify(VerifyArgs),
    #[command(about = "Replace the long description embedded in a wheel")]
    SetDescription(DescriptionArgs),
    #[command(about = "Mint a new filename by appending a .postN/.devN suffix")]
    AddSuffix(SuffixArgs),
    #[command(about = "Sort a dist directory into {dist}-{version}/python-X.Y/")]
    Organize(OrganizeArgs),
}

impl CommandGroupCli {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Release(_) => "release",
            Self::Verify(_) => "verify",
            Self::SetDescription(_) => "set-description",
            Self::AddSuffix(_) => "add-suffix",
            Self::Organize(_) => "organize",
        }
    }
}

#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct ReleaseArgs {
    #[arg(
        long,
        env = "WHEELWRIGHT_CATALOG",
        default_value = DEFAULT_CATALOG,
        help = "Variant catalog (build_config.json)"
    )]
    pub catalog: PathBuf,
    #[arg(long, default_value = "all", help = "Variant name from the catalog, or `all`")]
    pub variant: VariantSelector,
    #[arg(
        long,
        required = true,
        value_delimiter = ',',
        help = "Upstream versions to release (comma separated)"
    )]
    pub versions: Vec<String>,
    #[arg(
        long = "python",
        default_value = "auto",
        help = "Runtimes: 3.12, 3.10,3.11, 3.10-3.13, or auto"
    )]
    pub python: RuntimeSpec,
    #[arg(long, default_value_t = BackendKind::Native, help = "Build backend: native or container")]
    pub backend: BackendKind,
    #[arg(
        long,
        default_value = "native",
        help = "Platform: x86_64, aarch64, all, or native"
    )]
    pub platform: PlatformSelector,
    #[arg(long = "out", default_value = "dist", help = "Output directory for wheels")]
    pub out_dir: PathBuf,
    #[arg(long, help = "Worker budget for verification and repackaging")]
    pub jobs: Option<usize>,
    #[arg(long, help = "Only publish wheels that already exist locally")]
    pub skip_build: bool,
    #[arg(long, help = "Do not mirror wheels to the release host")]
    pub skip_release: bool,
    #[arg(long, help = "Append .postN or .devN to every published version")]
    pub version_suffix: Option<VersionSuffix>,
    #[arg(long, help = "Classify the matrix and stop")]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[arg(required = true, value_name = "PATH", help = "Wheels or directories")]
    pub paths: Vec<PathBuf>,
    #[arg(long, help = "Worker budget")]
    pub jobs: Option<usize>,
}

#[derive(Args, Debug)]
pub struct DescriptionArgs {
    #[arg(value_name = "WHEEL")]
    pub wheel: PathBuf,
    #[arg(long, value_name = "PATH", help = "File holding the new description")]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct SuffixArgs {
    #[arg(value_name = "WHEEL")]
    pub wheel: PathBuf,
    #[arg(long, help = "Suffix such as .post1 or .dev2")]
    pub suffix: VersionSuffix,
}

#[derive(Args, Debug)]
pub struct OrganizeArgs {
    #[arg(value_name = "DIR", default_value = "dist")]
    pub dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        WheelwrightCli::command().debug_assert();
    }

    #[test]
    fn release_arguments_parse_into_domain_types() {
        let cli = WheelwrightCli::try_parse_from([
            "wheelwright",
            "release",
            "--variant",
            "avx512",
            "--versions",
            "0.6.0,v0.7.0",
            "--python",
            "3.10-3.12",
            "--platform",
            "x86_64",
            "--backend",
            "container",
            "--version-suffix",
            ".post1",
        ])
        .expect("parse");
        let CommandGroupCli::Release(args) = cli.command else {
            panic!("expected release");
        };
        assert_eq!(args.variant, VariantSelector::Named("avx512".into()));
        assert_eq!(args.versions, vec!["0.6.0", "v0.7.0"]);
        assert!(matches!(args.python, RuntimeSpec::Explicit(ref runtimes) if runtimes.len() == 3));
        assert_eq!(args.backend, BackendKind::Container);
        assert_eq!(args.version_suffix.map(|s| s.to_string()), Some(".post1".into()));
    }

    #[test]
    fn malformed_suffixes_are_rejected() {
        let result = WheelwrightCli::try_parse_from([
            "wheelwright",
            "add-suffix",
            "pkg-1.0-py3-none-any.whl",
            "--suffix",
            ".rc1",
        ]);
        assert!(result.is_err());
    }
}
