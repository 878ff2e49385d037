use std::path::PathBuf;

use clap::{Args, ValueEnum};
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use itertools::Itertools;
use serde::Serialize;

use super::common::{self, Context, Outcome, DEFAULT_OUTPUT_DIR};
use crate::{plan, target::Target, Result};

#[derive(Debug, Default, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Format {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// List the full matrix instead of the MVP matrix.
    #[arg(long = "all", conflicts_with = "mvp")]
    pub all: bool,

    /// List the MVP matrix. This is the default.
    #[arg(long = "mvp")]
    pub mvp: bool,

    #[arg(long = "format", value_enum, default_value_t)]
    pub format: Format,

    /// Output root used to show where each target's packages end up.
    #[arg(long = "output-dir", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Registry to show the registry images for, overriding the configured one.
    #[arg(long = "registry", value_parser = common::registry)]
    pub registry: Option<String>,
}

#[derive(Serialize)]
struct Row<'a> {
    id: String,
    #[serde(flatten)]
    target: &'a Target,
    backend_name: &'a str,
    image: String,
    registry_image: String,
    output_dir: PathBuf,
}

fn bold_header<I: IntoIterator<Item = &'static str>>(table: &mut Table, names: I) {
    table
        .load_preset(comfy_table::presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            names
                .into_iter()
                .map(|name| Cell::new(name).add_attribute(Attribute::Bold)),
        );
}

pub fn list(context: &Context, args: ListArgs) -> Result<Outcome> {
    let resolver = context.resolver();
    let targets = if args.all {
        resolver.expand_full()
    } else {
        resolver.expand_mvp()
    };
    let settings = context.settings(&args.output_dir, args.registry.as_deref());

    let rows: Vec<Row> = targets
        .iter()
        .map(|target| {
            let invocation = plan::plan(target, &settings);
            Row {
                id: target.to_string(),
                target,
                backend_name: context
                    .config
                    .backend(&target.backend)
                    .map_or(target.backend.as_str(), |backend| backend.display_name.as_str()),
                image: invocation.tag,
                registry_image: invocation.registry_tag,
                output_dir: invocation.output_path,
            }
        })
        .collect();

    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        Format::Table => {
            // Keeps column names together with a function that produces the cell from the row.
            type Accessor = fn(&Row) -> String;

            fn accessor(f: Accessor) -> Accessor {
                f
            }

            let columns = [
                ("target", accessor(|row| row.id.clone())),
                ("backend", accessor(|row| row.backend_name.to_owned())),
                ("image", accessor(|row| row.image.clone())),
                ("registry image", accessor(|row| row.registry_image.clone())),
                ("output", accessor(|row| row.output_dir.display().to_string())),
            ];
            let (names, accessors): (Vec<_>, Vec<_>) = columns.into_iter().unzip();

            let mut table = Table::new();
            bold_header(&mut table, names);
            for row in &rows {
                table.add_row(accessors.iter().map(|f| f(row)));
            }

            println!("{table}");
            println!("{} target(s)", rows.len());
        }
    }

    Ok(if rows.is_empty() {
        Outcome::NothingToDo
    } else {
        Outcome::Success
    })
}

pub fn backends(context: &Context) -> Result<Outcome> {
    let mut table = Table::new();
    bold_header(
        &mut table,
        [
            "backend",
            "name",
            "architectures",
            "dependencies",
            "compile options",
            "package",
        ],
    );

    let library = &context.config.library.name;
    for backend in &context.config.backends {
        table.add_row([
            backend.name.clone(),
            backend.display_name.clone(),
            match &backend.architectures {
                Some(archs) => archs.join(", "),
                None => format!("all ({})", context.config.architectures.join(", ")),
            },
            backend.dependencies.join("\n"),
            backend
                .compile_options
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .join("\n"),
            backend.render_package_name(library),
        ]);
    }

    println!("{table}");
    Ok(Outcome::Success)
}
