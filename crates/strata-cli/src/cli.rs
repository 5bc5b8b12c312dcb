//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Strata - resolve stack manifests into component configuration
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project directory holding strata.yaml
    #[arg(long, global = true, value_name = "DIR")]
    pub base_path: Option<PathBuf>,

    /// Override stacks.name_pattern
    #[arg(long, global = true, value_name = "PATTERN")]
    pub name_pattern: Option<String>,

    /// Override settings.list_merge_strategy (replace, append or merge)
    #[arg(long, global = true, value_name = "STRATEGY")]
    pub list_merge_strategy: Option<String>,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Show resolved configuration
    Describe {
        #[command(subcommand)]
        target: DescribeTarget,
    },

    /// Check manifests for errors
    Validate {
        #[command(subcommand)]
        target: ValidateTarget,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum DescribeTarget {
    /// Every component of every stack
    ///
    /// Examples:
    ///   strata describe stacks
    ///   strata describe stacks -s acme-ue2-dev --sections vars
    ///   strata describe stacks --components vpc --format json
    Stacks {
        /// Only these stacks (name or manifest path)
        #[arg(short, long = "stack")]
        stacks: Vec<String>,

        /// Only these components
        #[arg(short, long = "components", value_delimiter = ',')]
        components: Vec<String>,

        /// Only these sections of each component
        #[arg(long = "sections", value_delimiter = ',')]
        sections: Vec<String>,

        #[command(flatten)]
        resolve: ResolveArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// One component in one stack
    Component {
        /// Component name
        component: String,

        /// Stack name or manifest path
        #[arg(short, long)]
        stack: String,

        #[command(flatten)]
        resolve: ResolveArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Where a value of a component comes from
    ///
    /// Example:
    ///   strata describe sources vpc -s acme-ue2-dev vars.cidr
    Sources {
        /// Component name
        component: String,

        /// Stack name or manifest path
        #[arg(short, long)]
        stack: String,

        /// Section and key, e.g. vars.cidr
        key: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Components changed between two git revisions
    Affected {
        /// Base revision to compare against
        #[arg(long, default_value = "HEAD")]
        base: String,

        /// Target revision (defaults to the working tree)
        #[arg(long)]
        target: Option<String>,

        /// Leave out components only included as dependents
        #[arg(long)]
        exclude_dependents: bool,

        #[command(flatten)]
        resolve: ResolveArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ValidateTarget {
    /// Every manifest under the stacks directory
    Stacks,
}

/// Switches that change how manifests are resolved.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveArgs {
    /// Skip imports that do not exist
    #[arg(long)]
    pub ignore_missing_imports: bool,

    /// Keep function calls whose collaborator fails
    #[arg(long)]
    pub lenient: bool,

    /// Leave function calls unevaluated
    #[arg(long)]
    pub skip_functions: bool,

    /// Abort resolution after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Yaml)]
    pub format: Format,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Yaml,
    Json,
}
