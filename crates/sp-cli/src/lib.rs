use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sp_core::{CoreError, Id, KeyValueStore};
use sp_fs::{load_config, render_export, resolve_store_path, set_config_path, FsStore};
use sp_state::{Controller, NoticeKind, Settings};
use sp_tui::{body_lines, build_screen, Form};

const LOG_ENV: &str = "STOCKPILE_LOG";
const LOG_FILE_NAME: &str = "stockpile.log";

#[derive(Parser)]
#[command(name = "stockpile", version, about = "Stockpile inventory manager")]
struct Cli {
    /// Store directory for this invocation.
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the store.
    Init {
        /// Optional path to initialize the store at.
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// List categories with their item counts.
    List,
    /// Print items and variants, for one category or all of them.
    Show { category: Option<String> },
    /// Add a category.
    AddCategory { name: String },
    /// Add an item to a category.
    AddItem { category: String, name: String },
    /// Add a variant to an item.
    AddVariant {
        category: String,
        item: String,
        #[arg(long)]
        color: String,
        #[arg(long)]
        price: String,
        #[arg(long)]
        qty: String,
    },
    /// Delete a category and all its items.
    RemoveCategory { name: String },
    /// Delete an item and all its variants.
    RemoveItem { category: String, name: String },
    /// Write the whole inventory to a JSON file.
    Export { path: PathBuf },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config().context("failed to read configuration")?;
    let settings = Settings::from(&config);

    let command = match cli.command {
        Some(command) => command,
        None => {
            let store = FsStore::new(resolve_store_path(&config, cli.store.as_deref())?);
            store.init().context("failed to create store directory")?;
            init_file_logging(store.path())?;
            info!(path = %store.path().display(), "starting interactive session");
            return sp_tui::run(store, settings);
        }
    };
    init_stderr_logging()?;

    if let Command::Init { path } = &command {
        let path = match path.clone().or(cli.store) {
            Some(path) => path,
            None => FsStore::default_path()?,
        };
        FsStore::new(path.clone())
            .init()
            .context("failed to initialize store")?;
        set_config_path(&path).context("failed to record store path")?;
        println!("Store initialized at {}", path.display());
        return Ok(());
    }

    let store = FsStore::new(resolve_store_path(&config, cli.store.as_deref())?);
    let stdout = io::stdout();
    execute(command, store, settings, &mut stdout.lock())
}

fn execute<S: KeyValueStore>(
    command: Command,
    store: S,
    settings: Settings,
    out: &mut impl Write,
) -> Result<()> {
    let mut controller = Controller::open(store, settings);
    if controller
        .notice()
        .is_some_and(|notice| notice.kind == NoticeKind::Error)
    {
        bail!("stored inventory could not be read");
    }

    match command {
        Command::List => list_categories(&controller, out),
        Command::Show { category } => show(&mut controller, category.as_deref(), out),
        Command::AddCategory { name } => {
            controller.add_category(&name).map_err(rejected)?;
            report(&controller, out)
        }
        Command::AddItem { category, name } => {
            let cat_id = find_category(&controller, &category)?;
            controller.select_category(cat_id);
            controller.add_item(&name).map_err(rejected)?;
            report(&controller, out)
        }
        Command::AddVariant {
            category,
            item,
            color,
            price,
            qty,
        } => {
            let item_id = find_item(&controller, &category, &item)?;
            controller
                .add_variant(item_id, &color, &price, &qty)
                .map_err(rejected)?;
            report(&controller, out)
        }
        Command::RemoveCategory { name } => {
            let cat_id = find_category(&controller, &name)?;
            controller.delete_category(cat_id).map_err(rejected)?;
            report(&controller, out)
        }
        Command::RemoveItem { category, name } => {
            let item_id = find_item(&controller, &category, &name)?;
            controller.delete_item(item_id).map_err(rejected)?;
            report(&controller, out)
        }
        Command::Export { path } => export(&controller, &path, out),
        Command::Init { .. } => unreachable!("handled above"),
    }
}

fn rejected(err: CoreError) -> anyhow::Error {
    anyhow!(err.message().to_string())
}

/// Turn the notice left by a mutation into output or a failure.
fn report<S: KeyValueStore>(controller: &Controller<S>, out: &mut impl Write) -> Result<()> {
    match controller.notice() {
        Some(notice) if notice.kind == NoticeKind::Error => Err(anyhow!(notice.message.clone())),
        Some(notice) => {
            writeln!(out, "{}", notice.message)?;
            Ok(())
        }
        None => Ok(()),
    }
}

fn find_category<S: KeyValueStore>(controller: &Controller<S>, name: &str) -> Result<Id> {
    controller
        .inventory()
        .find_category_by_name(name)
        .map(|category| category.id)
        .ok_or_else(|| anyhow!("category \"{name}\" not found"))
}

fn find_item<S: KeyValueStore>(controller: &Controller<S>, category: &str, name: &str) -> Result<Id> {
    let cat_id = find_category(controller, category)?;
    controller
        .inventory()
        .find_item_by_name(cat_id, name)
        .map(|item| item.id)
        .ok_or_else(|| anyhow!("item \"{name}\" not found in \"{category}\""))
}

fn list_categories<S: KeyValueStore>(controller: &Controller<S>, out: &mut impl Write) -> Result<()> {
    let inventory = controller.inventory();
    for category in inventory.categories() {
        writeln!(
            out,
            "{}\t{}",
            category.name,
            inventory.items_in(category.id).count()
        )?;
    }
    Ok(())
}

fn show<S: KeyValueStore>(
    controller: &mut Controller<S>,
    category: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    let targets = match category {
        Some(name) => vec![find_category(controller, name)?],
        None => controller
            .inventory()
            .categories()
            .iter()
            .map(|category| category.id)
            .collect(),
    };

    if targets.is_empty() {
        let screen = build_screen(controller, &Form::default());
        for line in body_lines(&screen.body) {
            writeln!(out, "{line}")?;
        }
        return Ok(());
    }

    for (index, cat_id) in targets.into_iter().enumerate() {
        if index > 0 {
            writeln!(out)?;
        }
        controller.select_category(cat_id);
        let screen = build_screen(controller, &Form::default());
        writeln!(out, "{}", screen.title)?;
        for line in body_lines(&screen.body) {
            if line.is_empty() {
                writeln!(out)?;
            } else {
                writeln!(out, "  {line}")?;
            }
        }
    }
    controller.back();
    Ok(())
}

fn export<S: KeyValueStore>(controller: &Controller<S>, path: &Path, out: &mut impl Write) -> Result<()> {
    let document = render_export(controller.inventory()).context("failed to render export")?;
    fs::write(path, format!("{document}\n")).context("failed to write export")?;
    writeln!(
        out,
        "Exported {} categories and {} items to {}",
        controller.inventory().categories().len(),
        controller.inventory().items().len(),
        path.display()
    )?;
    Ok(())
}

fn log_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default))
}

fn init_file_logging(dir: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE_NAME))
        .context("failed to open log file")?;
    tracing_subscriber::fmt()
        .with_env_filter(log_filter("info"))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow!("failed to initialize logging: {err}"))
}

fn init_stderr_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter("warn"))
        .with_writer(io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to initialize logging: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use sp_fs::ExportDocument;
    use tempfile::TempDir;

    fn run_command(temp: &TempDir, command: Command) -> Result<String> {
        let store = FsStore::new(temp.path().join("store"));
        let mut out = Vec::new();
        execute(command, store, Settings::default(), &mut out)?;
        Ok(String::from_utf8(out).expect("utf8 output"))
    }

    fn seed(temp: &TempDir) {
        run_command(temp, Command::AddCategory { name: "Shoes".into() }).expect("category");
        run_command(
            temp,
            Command::AddItem {
                category: "shoes".into(),
                name: "Sneaker".into(),
            },
        )
        .expect("item");
        run_command(
            temp,
            Command::AddVariant {
                category: "Shoes".into(),
                item: "sneaker".into(),
                color: "Red".into(),
                price: "19.99".into(),
                qty: "3".into(),
            },
        )
        .expect("variant");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_store_and_variant_fields() {
        let cli = Cli::try_parse_from([
            "stockpile",
            "add-variant",
            "Shoes",
            "Sneaker",
            "--color",
            "Red",
            "--price",
            "19.99",
            "--qty",
            "3",
            "--store",
            "/tmp/stock",
        ])
        .expect("parse");
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/stock")));
        assert!(matches!(
            cli.command,
            Some(Command::AddVariant { ref color, .. }) if color == "Red"
        ));
    }

    #[test]
    fn no_subcommand_means_interactive() {
        let cli = Cli::try_parse_from(["stockpile"]).expect("parse");
        assert!(cli.command.is_none());
    }

    #[test]
    fn mutations_print_notice_and_persist() {
        let temp = TempDir::new().expect("temp dir");
        let output = run_command(&temp, Command::AddCategory { name: "Shoes".into() }).unwrap();
        assert_eq!(output, "Category added!\n");
        assert!(temp.path().join("store").join("stockpile-cats.json").exists());
    }

    #[test]
    fn validation_errors_carry_notice_text() {
        let temp = TempDir::new().expect("temp dir");
        run_command(&temp, Command::AddCategory { name: "Shoes".into() }).unwrap();
        let err = run_command(&temp, Command::AddCategory { name: " shoes ".into() }).unwrap_err();
        assert_eq!(err.to_string(), "Category with this name already exists.");

        let err = run_command(
            &temp,
            Command::AddItem {
                category: "Hats".into(),
                name: "Cap".into(),
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "category \"Hats\" not found");
    }

    #[test]
    fn show_renders_formatted_prices() {
        let temp = TempDir::new().expect("temp dir");
        seed(&temp);
        run_command(&temp, Command::AddCategory { name: "Bags".into() }).unwrap();

        let output = run_command(&temp, Command::Show { category: None }).unwrap();
        assert_eq!(
            output,
            "Shoes\n  Sneaker\n    Color | Price | Qty\n    Red | 20 | 3\n\nBags\n  No items found in \"Bags\".\n  Add a new item type above to get started.\n"
        );

        let output = run_command(
            &temp,
            Command::Show {
                category: Some("bags".into()),
            },
        )
        .unwrap();
        assert!(output.starts_with("Bags\n"));
    }

    #[test]
    fn show_on_empty_store() {
        let temp = TempDir::new().expect("temp dir");
        let output = run_command(&temp, Command::Show { category: None }).unwrap();
        assert_eq!(output, "No categories yet.\nAdd one above to get started!\n");
    }

    #[test]
    fn list_counts_items() {
        let temp = TempDir::new().expect("temp dir");
        seed(&temp);
        run_command(&temp, Command::AddCategory { name: "Bags".into() }).unwrap();
        let output = run_command(&temp, Command::List).unwrap();
        assert_eq!(output, "Shoes\t1\nBags\t0\n");
    }

    #[test]
    fn removing_a_category_removes_its_items() {
        let temp = TempDir::new().expect("temp dir");
        seed(&temp);
        let output = run_command(&temp, Command::RemoveCategory { name: "Shoes".into() }).unwrap();
        assert_eq!(output, "Category deleted\n");
        let output = run_command(&temp, Command::List).unwrap();
        assert!(output.is_empty());

        let target = temp.path().join("export.json");
        run_command(&temp, Command::Export { path: target.clone() }).unwrap();
        let document: ExportDocument =
            serde_json::from_str(&fs::read_to_string(target).unwrap()).unwrap();
        assert!(document.items.is_empty());
    }

    #[test]
    fn remove_item_and_export() {
        let temp = TempDir::new().expect("temp dir");
        seed(&temp);
        run_command(
            &temp,
            Command::AddItem {
                category: "Shoes".into(),
                name: "Boot".into(),
            },
        )
        .unwrap();
        let output = run_command(
            &temp,
            Command::RemoveItem {
                category: "Shoes".into(),
                name: "SNEAKER".into(),
            },
        )
        .unwrap();
        assert_eq!(output, "Item deleted\n");

        let target = temp.path().join("export.json");
        let output = run_command(&temp, Command::Export { path: target.clone() }).unwrap();
        assert!(output.starts_with("Exported 1 categories and 1 items to "));
        let document: ExportDocument =
            serde_json::from_str(&fs::read_to_string(target).unwrap()).unwrap();
        assert_eq!(document.categories[0].name, "Shoes");
        assert_eq!(document.items[0].name, "Boot");
        assert!(document.items[0].variants.is_empty());
    }

    #[test]
    fn incomplete_variant_is_rejected() {
        let temp = TempDir::new().expect("temp dir");
        seed(&temp);
        let err = run_command(
            &temp,
            Command::AddVariant {
                category: "Shoes".into(),
                item: "Sneaker".into(),
                color: "Blue".into(),
                price: " ".into(),
                qty: "1".into(),
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "All variant fields are required.");
    }

    #[test]
    fn unreadable_store_is_not_overwritten() {
        let temp = TempDir::new().expect("temp dir");
        let dir = temp.path().join("store");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stockpile-cats.json"), "not json").unwrap();
        assert!(run_command(&temp, Command::AddCategory { name: "Shoes".into() }).is_err());
        assert_eq!(
            fs::read_to_string(dir.join("stockpile-cats.json")).unwrap(),
            "not json"
        );
    }
}
