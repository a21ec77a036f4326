use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Strata - taxonomy and unit composition over layered documents
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Repository root (defaults to STRATA_REPOSITORY)
    #[arg(long, global = true)]
    pub repository: Option<PathBuf>,

    /// Identifier of the taxonomy document (defaults to the demo identifier)
    #[arg(long, global = true)]
    pub document: Option<String>,

    /// Print value objects as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Define and inspect taxa
    #[command(subcommand)]
    Taxon(TaxonCommand),

    /// Create and list units
    #[command(subcommand)]
    Unit(UnitCommand),
}

#[derive(Subcommand, Debug)]
pub enum TaxonCommand {
    /// Define a taxon, or confirm an existing compatible one
    Define(DefineArgs),

    /// List taxa ordered by name
    List,

    /// Walk ancestors (or descendants) of a taxon
    Lineage {
        name: String,

        /// Walk taxa built on this one instead
        #[arg(long)]
        descendants: bool,
    },
}

#[derive(Args, Debug)]
pub struct DefineArgs {
    pub name: String,

    /// Classification field, e.g. --field area=rnd
    #[arg(long = "field", value_name = "KEY=VALUE")]
    pub fields: Vec<String>,

    /// Inherited taxa, strongest first
    #[arg(long, value_delimiter = ',')]
    pub inherits: Vec<String>,

    /// Referenced taxa, strongest first
    #[arg(long, value_delimiter = ',')]
    pub references: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum UnitCommand {
    /// Create one or more units of a taxon
    Create(CreateArgs),

    /// List units of a taxon and its descendants
    List { taxon: String },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    pub taxon: String,

    /// Unit discriminators
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Display label, repeated to pair with names in order
    #[arg(long = "label")]
    pub labels: Vec<String>,

    /// Authored property, e.g. --prop lod=2 (single unit only)
    #[arg(long = "prop", value_name = "KEY=VALUE")]
    pub props: Vec<String>,
}
