//! Command-line dispatcher onto the engine services.
//!
//! # Responsibility
//! - Parse arguments and environment into a session.
//! - Call taxonomy/unit services and print value objects.

mod cli;

use std::error::Error;
use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;
use cli::{Cli, Commands, CreateArgs, DefineArgs, TaxonCommand, UnitCommand};
use log::{error, info};
use strata_core::{
    CancelFlag, DocumentStore, EngineConfig, Field, FieldMap, FieldValue, Identifier, MetaValue,
    PropertyMap, TaxonDefinition, TaxonomyService, UnitService,
};

type CliResult<T> = Result<T, Box<dyn Error>>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_command module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let mut config = EngineConfig::from_env()?;
    if let Some(repository) = &cli.repository {
        config = config.with_repository(repository)?;
    }
    config.init_logging()?;
    info!(
        "event=cli_start module=cli status=ok core_version={}",
        strata_core::core_version()
    );

    let store = DocumentStore::new(config.locator());
    let identifier = match &cli.document {
        Some(text) => Identifier::parse(text)?,
        None => Identifier::build(&Identifier::default_fields())?,
    };
    let document = store.fetch(&identifier, true)?;

    match cli.command {
        Commands::Taxon(TaxonCommand::Define(args)) => {
            cmd_taxon_define(&TaxonomyService::new(&document), &args, cli.json)
        }
        Commands::Taxon(TaxonCommand::List) => {
            cmd_taxon_list(&TaxonomyService::new(&document), cli.json)
        }
        Commands::Taxon(TaxonCommand::Lineage { name, descendants }) => {
            cmd_taxon_lineage(&TaxonomyService::new(&document), &name, descendants, cli.json)
        }
        Commands::Unit(UnitCommand::Create(args)) => {
            cmd_unit_create(&UnitService::new(&store, &document), &args, cli.json)
        }
        Commands::Unit(UnitCommand::List { taxon }) => {
            cmd_unit_list(&UnitService::new(&store, &document), &taxon, cli.json)
        }
    }?;
    store.close()?;
    Ok(())
}

fn cmd_taxon_define(service: &TaxonomyService<'_>, args: &DefineArgs, json: bool) -> CliResult<()> {
    let mut fields = FieldMap::new();
    for pair in &args.fields {
        let (key, value) = split_pair(pair)?;
        fields.insert(Field::from_str(key)?, FieldValue::from(value));
    }
    let definition = TaxonDefinition::new(args.name.as_str())
        .fields(fields)
        .inherits(args.inherits.iter().map(String::as_str))
        .references(args.references.iter().map(String::as_str));

    let taxon = service.define_taxon(&definition)?;
    service.save()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&taxon)?);
    } else {
        println!("{} {}", taxon.name, taxon.path);
    }
    Ok(())
}

fn cmd_taxon_list(service: &TaxonomyService<'_>, json: bool) -> CliResult<()> {
    let taxa = service.list_taxa()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&taxa)?);
        return Ok(());
    }
    for taxon in taxa {
        let parents = taxon
            .inherits
            .iter()
            .chain(&taxon.references)
            .map(String::as_str)
            .collect::<Vec<_>>();
        if parents.is_empty() {
            println!("{}", taxon.name);
        } else {
            println!("{} <- {}", taxon.name, parents.join(", "));
        }
    }
    Ok(())
}

fn cmd_taxon_lineage(
    service: &TaxonomyService<'_>,
    name: &str,
    descendants: bool,
    json: bool,
) -> CliResult<()> {
    let lineage = if descendants {
        service.descendants(name)?
    } else {
        service.ancestors(name)?
    };
    let names = lineage.collect::<Vec<_>>();
    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(())
}

fn cmd_unit_create(service: &UnitService<'_>, args: &CreateArgs, json: bool) -> CliResult<()> {
    if let [name] = args.names.as_slice() {
        let mut props = PropertyMap::new();
        for pair in &args.props {
            let (key, value) = split_pair(pair)?;
            props.insert(key.to_string(), parse_scalar(value));
        }
        let label = args
            .labels
            .first()
            .map(String::as_str)
            .filter(|label| !label.is_empty());
        let unit = service.create_unit(&args.taxon, name, label, &props)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&unit)?);
        } else {
            println!("{} {}", unit.id(), unit.asset);
        }
        return Ok(());
    }

    if !args.props.is_empty() {
        return Err("--prop applies to a single unit".into());
    }
    let report = service.create_units(
        &args.taxon,
        &args.names,
        &args.labels,
        &CancelFlag::new(),
    );
    if json {
        let units = report.successes().collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&units)?);
    } else {
        for unit in report.successes() {
            println!("{} {}", unit.id(), unit.asset);
        }
    }
    for (name, err) in report.failures() {
        eprintln!("failed {}/{name}: {err}", args.taxon);
    }
    match report.failures().count() {
        0 => Ok(()),
        failed => Err(format!("{failed} of {} units failed", args.names.len()).into()),
    }
}

fn cmd_unit_list(service: &UnitService<'_>, taxon: &str, json: bool) -> CliResult<()> {
    let units = service.list_units(taxon)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&units)?);
    } else {
        for unit in units {
            match &unit.label {
                Some(label) => println!("{} \"{label}\"", unit.id()),
                None => println!("{}", unit.id()),
            }
        }
    }
    Ok(())
}

fn split_pair(pair: &str) -> CliResult<(&str, &str)> {
    pair.split_once('=')
        .map(|(key, value)| (key.trim(), value.trim()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{pair}`").into())
}

fn parse_scalar(value: &str) -> MetaValue {
    if let Ok(number) = value.parse::<i64>() {
        return MetaValue::Int(number);
    }
    if let Some(number) = value.parse::<f64>().ok().filter(|number| number.is_finite()) {
        return MetaValue::Float(number);
    }
    match value {
        "true" => MetaValue::Bool(true),
        "false" => MetaValue::Bool(false),
        _ => MetaValue::from(value),
    }
}
