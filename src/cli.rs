#[cfg(feature = "server")]
use anyhow::bail;
use anyhow::{Context, Result, anyhow};
use clap::Parser;
#[cfg(feature = "server")]
use dialoguer::Input;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

#[cfg(feature = "server")]
use orgdraw::credentials::Credential;
#[cfg(feature = "server")]
use orgdraw::database::{Database, DatabaseConfig};
#[cfg(feature = "server")]
use orgdraw::export::export_all_diagrams;
#[cfg(feature = "server")]
use orgdraw::serve::{ServeArgs, run_serve};
use orgdraw::render_svg;
use orgdraw::utils::parse_diagram_document;

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Parser)]
#[command(
    name = "orgdraw",
    about = "Render a stored org-chart diagram (JSON) to SVG."
)]
pub struct RenderArgs {
    /// Path to the diagram JSON. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: String,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Background color for the canvas.
    #[arg(short = 'b', long = "background-color", default_value = "white")]
    background_color: String,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[cfg(feature = "server")]
#[derive(Debug, Parser)]
#[command(name = "orgdraw token", about = "Issue or revoke a bearer credential for the API.")]
pub struct TokenArgs {
    /// Account the credential acts for. Prompted for when omitted.
    #[arg(long, conflicts_with = "revoke")]
    owner: Option<String>,

    /// Revoke this token instead of issuing a new one.
    #[arg(long, value_name = "TOKEN")]
    revoke: Option<String>,

    /// SQLite database file.
    #[arg(long)]
    db: Option<PathBuf>,
}

#[cfg(feature = "server")]
#[derive(Debug, Parser)]
#[command(name = "orgdraw export", about = "Write every diagram of an owner to a zip file.")]
pub struct ExportArgs {
    #[arg(long)]
    owner: String,

    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// SQLite database file.
    #[arg(long)]
    db: Option<PathBuf>,
}

pub fn run_render(cli: RenderArgs) -> Result<()> {
    let input = parse_input(&cli.input)?;
    let output = parse_output(cli.output.as_deref(), &input)?;

    let source = load_source(&input)?;
    let (name, content) = parse_diagram_document(&source)?;
    let svg = render_svg(&content, &cli.background_color)?;

    if !cli.quiet {
        if let (Some(name), OutputDestination::File(_)) = (&name, &output) {
            println!("Rendering '{name}'");
        }
    }
    write_output(output, svg.as_bytes(), cli.quiet)
}

#[cfg(feature = "server")]
async fn run_token(cli: TokenArgs) -> Result<()> {
    let db = Database::new(cli.db.map(DatabaseConfig::at).unwrap_or_default()).await?;

    if let Some(token) = cli.revoke {
        let Some(credential) = Credential::resolve(db.pool(), token.trim()).await? else {
            bail!("unknown credential");
        };
        credential.revoke(db.pool()).await?;
        println!("Revoked credential for '{}'", credential.owner);
        return Ok(());
    }

    let owner = match cli.owner {
        Some(owner) => owner,
        None => Input::<String>::new()
            .with_prompt("Owner")
            .interact_text()
            .context("failed to read owner")?,
    };
    let owner = owner.trim();
    if owner.is_empty() {
        bail!("owner must not be empty");
    }

    let credential = Credential::issue(db.pool(), owner).await?;
    println!("{}", credential.token);
    Ok(())
}

#[cfg(feature = "server")]
async fn run_export(cli: ExportArgs) -> Result<()> {
    let db = Database::new(cli.db.map(DatabaseConfig::at).unwrap_or_default()).await?;
    let archive = export_all_diagrams(db.pool(), &cli.owner).await?;
    if archive.is_empty() {
        bail!("no diagrams owned by '{}'", cli.owner);
    }
    fs::write(&cli.output, &archive)
        .with_context(|| format!("failed to write '{}'", cli.output.display()))?;
    println!("Exported diagrams -> {}", cli.output.display());
    Ok(())
}

fn subcommand_args(args: &[String]) -> impl Iterator<Item = String> + '_ {
    std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned())
}

pub async fn dispatch() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        #[cfg(feature = "server")]
        Some("serve") => run_serve(ServeArgs::parse_from(subcommand_args(&args))).await,
        #[cfg(feature = "server")]
        Some("token") => run_token(TokenArgs::parse_from(subcommand_args(&args))).await,
        #[cfg(feature = "server")]
        Some("export") => run_export(ExportArgs::parse_from(subcommand_args(&args))).await,
        #[cfg(not(feature = "server"))]
        Some(command @ ("serve" | "token" | "export")) => Err(anyhow!(
            "'{command}' command requires the 'server' feature to be enabled"
        )),
        Some("render") => run_render(RenderArgs::parse_from(subcommand_args(&args))),
        _ => run_render(RenderArgs::parse_from(args)),
    }
}

fn parse_input(input: &str) -> Result<InputSource> {
    match input {
        "-" => Ok(InputSource::Stdin),
        path_str => {
            let path = PathBuf::from(path_str);
            if !path.exists() {
                return Err(anyhow!("input file '{path_str}' does not exist"));
            }
            Ok(InputSource::File(path))
        }
    }
}

fn parse_output(output: Option<&str>, input: &InputSource) -> Result<OutputDestination> {
    match output {
        Some("-") => Ok(OutputDestination::Stdout),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(anyhow!(
                        "output directory '{}' does not exist",
                        parent.display()
                    ));
                }
            }
            Ok(OutputDestination::File(path))
        }
        None => match input {
            InputSource::File(path) => Ok(OutputDestination::File(path.with_extension("svg"))),
            InputSource::Stdin => Ok(OutputDestination::Stdout),
        },
    }
}

fn load_source(source: &InputSource) -> Result<String> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            if buffer.trim().is_empty() {
                Err(anyhow!("no diagram supplied on stdin"))
            } else {
                Ok(buffer)
            }
        }
        InputSource::File(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            if contents.trim().is_empty() {
                Err(anyhow!("input file '{}' was empty", path.display()))
            } else {
                Ok(contents)
            }
        }
    }
}

fn write_output(dest: OutputDestination, bytes: &[u8], quiet: bool) -> Result<()> {
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, bytes)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            if !quiet {
                println!("Generated diagram -> {}", path.display());
            }
        }
    }
    Ok(())
}
