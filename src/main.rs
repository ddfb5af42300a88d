use anyhow::{anyhow, Context};
use clap::Parser;
use fxtdump::*;
use log::info;
use std::path::PathBuf;

/// Template-driven export of an object graph
///
/// Renders the object given by **--root** from the model in **--data** using
/// the template in **--template**, writing nested markup or flat tag-records
/// to **--output**. When the template declares an auxiliary template, its
/// output is written next to the primary output with the declared extension.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// The template document
    #[clap(short, long, value_name = "file")]
    template: PathBuf,

    /// The object model to export from
    #[clap(long, value_name = "file")]
    data: PathBuf,

    /// Identifier of the object to start from
    #[clap(short, long, value_name = "id")]
    root: u64,

    /// Output file
    #[clap(short, long, value_name = "file")]
    output: PathBuf,

    /// Output format. Overrides the template header
    #[clap(short, long, value_name = "xml|sf")]
    format: Option<OutputFormat>,

    /// Unicode normalization applied to every written value. Overrides the
    /// template header
    #[clap(long, value_name = "none|nfc|nfd|nfkc|nfkd")]
    normalization: Option<Normalization>,

    /// Fail when an object has no class template instead of skipping it
    #[clap(long)]
    strict: bool,

    /// Use the nearest base class template when a class has none of its own
    #[clap(long)]
    base_class_fallback: bool,

    /// Write object identities as GUIDs
    #[clap(long)]
    guids: bool,

    /// Set a test variable for conditional template nodes. May be repeated
    #[clap(long = "var", value_name = "NAME=BOOL")]
    vars: Vec<String>,

    /// Do not write the auxiliary output
    #[clap(long)]
    no_auxiliary: bool,

    /// Directory external files are copied into. Defaults to the directory of
    /// the output file
    #[clap(long, value_name = "directory")]
    export_directory: Option<PathBuf>,

    /// Turn on debugging
    #[clap(short, long)]
    debug: bool,

    /// Turn on tracing. Also turns on **--debug|d**
    #[clap(short('T'), long)]
    trace: bool,

    /// Log only errors
    #[clap(short, long)]
    quiet: bool,
}

fn parse_var(s: &str) -> anyhow::Result<(String, bool)> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("Test variable '{}' is not NAME=BOOL", s))?;
    let value = match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => true,
        "false" | "no" | "0" => false,
        other => return Err(anyhow!("Test variable '{}' has non-boolean value '{}'", name, other)),
    };
    Ok((name.trim().to_string(), value))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.trace {
        "trace"
    } else if args.debug {
        "debug"
    } else if args.quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let template = Template::load(&args.template)
        .with_context(|| format!("Failed to load template {}", args.template.display()))?;
    let model = MemoryModel::load(&args.data)
        .with_context(|| format!("Failed to load model {}", args.data.display()))?;

    let options = DumpOptions {
        format: args.format,
        normalization: args.normalization,
        strict: args.strict.then(|| true),
        base_class_fallback: args.base_class_fallback.then(|| true),
        id_style: args.guids.then(|| IdStyle::Guid),
        skip_auxiliary: args.no_auxiliary,
        export_dir: args.export_directory.clone(),
        ..DumpOptions::default()
    };
    let mut dumper = Dumper::new(&model, options);
    for var in &args.vars {
        let (name, value) = parse_var(var)?;
        dumper.set_test_variable(name, value);
    }
    dumper.on_progress(|event| log::debug!("Progress: {:?}", event));

    let outcome = dumper
        .dump_to_file(&template, ObjRef(args.root), &args.output)
        .with_context(|| format!("Failed to export {} to {}", args.root, args.output.display()))?;
    info!("Export {:?}", outcome);
    Ok(())
}
