//! Stockdesk - command-line front end for the inventory administration backend.
//!
//! Every command goes through the core `ApiClient`, so an expired access
//! token is refreshed transparently. When the session cannot be recovered
//! the user is told to log in again.

use std::io;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use stockdesk_core::models::{
    category::category_name, Category, CategoryUpdate, ItemAttachment, ItemUpdate, NewCategory,
    NewItem,
};
use stockdesk_core::{
    ApiError, ApiResponse, AuthEvent, Claims, Config, PageRequest, Paged, SessionManager,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log file name prefix inside the cache directory
const LOG_FILE_NAME: &str = "stockdesk.log";

/// Commands that work without a session
const ANONYMOUS_COMMANDS: [&str; 6] = ["login", "register", "confirm", "help", "--help", "-h"];

const USAGE: &str = "\
Usage: stockdesk [--log-file] <command> [args]

Session:
  login [email]                      Log in (prompts for the password)
  logout                             Log out and forget stored credentials
  whoami                             Show the current user, roles and permissions
  register <name> <email>            Create an account (prompts for the password)
  confirm <email> <code>             Confirm an email address with the emailed code

Items:
  items [page] [size] [search]       List items
  item <id>                          Show one item
  add-item <name> <qty> <categoryId> [location] [file]
  set-quantity <id> <qty>            Update an item's quantity
  delete-item <id>                   Delete an item
  file-url <fileName>                Resolve an attachment download URL
  delete-file <fileId>               Delete a stored attachment

Categories:
  categories [page] [size] [search]  List categories
  add-category <name> [description]  Create a category
  rename-category <id> <name>        Rename a category
  delete-category <id>               Delete a category

Employees:
  employees [page] [size] [search]   List employees
  employee <email>                   Show one employee
  delete-employee <email>            Delete an employee
  add-role <employeeId> <roleId>     Grant a role
  remove-role <employeeId> <roleId>  Revoke a role
";

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` controls the level (default `warn`). With `--log-file` the same
/// events also go to a daily rolling file in the cache directory; the returned
/// guard must stay alive until exit so buffered lines are flushed.
fn init_tracing(config: &Config, log_to_file: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_to_file.then(|| config.cache_dir()) {
        Some(Ok(dir)) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Some(Err(e)) => {
            eprintln!("Warning: file logging disabled: {}", e);
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let log_to_file = match args.iter().position(|a| a == "--log-file") {
        Some(index) => {
            args.remove(index);
            true
        }
        None => false,
    };

    let mut config = Config::load()?;
    let _guard = init_tracing(&config, log_to_file);
    info!(base_url = %config.base_url, "Stockdesk starting");

    let Some((command, rest)) = args.split_first() else {
        print!("{}", USAGE);
        return Ok(ExitCode::SUCCESS);
    };

    let client = config.build_client()?;
    let session = SessionManager::new(client.clone());
    let mut events = client.subscribe();

    if should_restore(command, &session.claims()?) {
        let restored = session.restore().await?;
        info!(restored, "Restored saved session");
    }

    let result = run(command, rest, &session, &mut config).await;
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }
    let code = ExitCode::from(exit_status(&result));

    // Tell the user to log in again once the session is lost
    while let Ok(event) = events.try_recv() {
        if let AuthEvent::AuthenticationLost { reason } = event {
            eprintln!("Session expired ({:?}). Run `stockdesk login` to sign in again.", reason);
        }
    }
    Ok(code)
}

async fn run(
    command: &str,
    args: &[String],
    session: &SessionManager,
    config: &mut Config,
) -> Result<()> {
    let client = session.client();

    match command {
        "login" => login(args, session, config).await,
        "logout" => {
            session.logout().await?;
            println!("Logged out");
            Ok(())
        }
        "whoami" => whoami(session),
        "register" => {
            let name = arg(args, 0, "name")?;
            let email = arg(args, 1, "email")?;
            let password = rpassword::prompt_password("Password: ")?;
            let confirm = rpassword::prompt_password("Confirm password: ")?;
            let ack = session.register(name, email, &password, &confirm).await?;
            println!("{}", ack.message_or("Check your email for a confirmation code"));
            Ok(())
        }
        "confirm" => {
            let ack = session
                .confirm_email(arg(args, 0, "email")?, arg(args, 1, "code")?)
                .await?;
            println!("{}", ack.message_or("Email confirmed"));
            Ok(())
        }

        "items" => {
            let page = client.list_items(&page_request(args)?).await?;
            let categories =
                categories_or_empty(client.list_categories(&PageRequest::page(1, 100)).await);
            for item in &page.items {
                println!(
                    "{:>6}  {:<30} {:>4}/{:<4} {:<16} {}",
                    item.item_id,
                    item.item_name,
                    item.quantity,
                    item.original_quantity,
                    item.location_display(),
                    item.category_id
                        .map(|id| category_name(&categories, id))
                        .unwrap_or_default()
                );
            }
            println!(
                "Page {} of {} ({} items)",
                page.page_index, page.total_pages, page.total_count
            );
            Ok(())
        }
        "item" => {
            let item = client
                .get_item(parse_id(arg(args, 0, "id")?)?)
                .await?
                .ok_or_else(|| anyhow!("Item not found"))?;
            println!("{}", serde_json::to_string_pretty(&item)?);
            Ok(())
        }
        "add-item" => {
            let quantity = parse_id(arg(args, 1, "quantity")?)?;
            let item = NewItem {
                item_name: arg(args, 0, "name")?.to_string(),
                quantity,
                original_quantity: quantity,
                location: args.get(3).cloned().unwrap_or_default(),
                description: String::new(),
                category_id: parse_id(arg(args, 2, "categoryId")?)?,
                file: args.get(4).map(|p| read_attachment(Path::new(p))).transpose()?,
            };
            print_ack(client.create_item(&item).await?, "Item created");
            Ok(())
        }
        "set-quantity" => {
            let item = client
                .get_item(parse_id(arg(args, 0, "id")?)?)
                .await?
                .ok_or_else(|| anyhow!("Item not found"))?;
            let update = ItemUpdate {
                quantity: parse_id(arg(args, 1, "quantity")?)?,
                ..ItemUpdate::from_item(&item)
            };
            print_ack(client.update_item(&update).await?, "Item updated");
            Ok(())
        }
        "delete-item" => {
            print_ack(
                client.delete_item(parse_id(arg(args, 0, "id")?)?).await?,
                "Item deleted",
            );
            Ok(())
        }
        "file-url" => {
            match client.file_url(arg(args, 0, "fileName")?).await? {
                ApiResponse::Text(url) => println!("{}", url),
                ApiResponse::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                ApiResponse::Empty => bail!("File not found"),
            }
            Ok(())
        }
        "delete-file" => {
            print_ack(client.delete_file(arg(args, 0, "fileId")?).await?, "File deleted");
            Ok(())
        }

        "categories" => {
            let page = client.list_categories(&page_request(args)?).await?;
            for category in &page.items {
                println!(
                    "{:>6}  {:<30} {:>5}  {}",
                    category.category_id,
                    category.category_name,
                    category.item_count.unwrap_or_default(),
                    category.description.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
        "add-category" => {
            let category = NewCategory {
                category_name: arg(args, 0, "name")?.to_string(),
                description: args.get(1).cloned().unwrap_or_default(),
            };
            print_ack(client.create_category(&category).await?, "Category created");
            Ok(())
        }
        "rename-category" => {
            let category_id = parse_id(arg(args, 0, "id")?)?;
            let current = client
                .get_category(category_id)
                .await?
                .ok_or_else(|| anyhow!("Category not found"))?;
            let update = CategoryUpdate {
                category_id,
                category_name: arg(args, 1, "name")?.to_string(),
                description: current.description.unwrap_or_default(),
            };
            print_ack(client.update_category(&update).await?, "Category updated");
            Ok(())
        }
        "delete-category" => {
            print_ack(
                client.delete_category(parse_id(arg(args, 0, "id")?)?).await?,
                "Category deleted",
            );
            Ok(())
        }

        "employees" => {
            let page = client.list_employees(&page_request(args)?).await?;
            for employee in &page.items {
                println!(
                    "{:<38} {:<24} {:<30} {}",
                    employee.employee_id,
                    employee.display_name(),
                    employee.email,
                    employee.permissions.join(", ")
                );
            }
            Ok(())
        }
        "employee" => {
            let employee = client
                .get_employee(arg(args, 0, "email")?)
                .await?
                .ok_or_else(|| anyhow!("Employee not found"))?;
            println!("{}", serde_json::to_string_pretty(&employee)?);
            Ok(())
        }
        "delete-employee" => {
            print_ack(
                client.delete_employee(arg(args, 0, "email")?).await?,
                "Employee deleted",
            );
            Ok(())
        }
        "add-role" => {
            let ack = client
                .add_employee_role(arg(args, 0, "employeeId")?, arg(args, 1, "roleId")?)
                .await?;
            print_ack(ack, "Role granted");
            Ok(())
        }
        "remove-role" => {
            let ack = client
                .remove_employee_role(arg(args, 0, "employeeId")?, arg(args, 1, "roleId")?)
                .await?;
            print_ack(ack, "Role revoked");
            Ok(())
        }

        "help" | "--help" | "-h" => {
            print!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command `{}`\n\n{}", other, USAGE),
    }
}

/// Extend a saved session whose access token has already expired.
fn should_restore(command: &str, claims: &Claims) -> bool {
    !ANONYMOUS_COMMANDS.contains(&command) && claims.is_expired()
}

/// Process exit status; the error itself has already been printed.
fn exit_status(result: &Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

/// Category names are cosmetic in listings; fall back to ids.
fn categories_or_empty(result: Result<Paged<Category>, ApiError>) -> Vec<Category> {
    match result {
        Ok(page) => page.items,
        Err(e) => {
            warn!(error = %e, "Could not load categories, showing ids");
            Vec::new()
        }
    }
}

async fn login(args: &[String], session: &SessionManager, config: &mut Config) -> Result<()> {
    let email = match args.first().or(config.last_email.as_ref()) {
        Some(email) => email.clone(),
        None => prompt_line("Email: ")?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", email))?;

    let user = session.login(&email, &password).await?;
    println!("Logged in as {} ({})", user.name, user.email);

    config.last_email = Some(user.email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
    Ok(())
}

fn whoami(session: &SessionManager) -> Result<()> {
    let Some(user) = session.user()? else {
        println!("Not logged in");
        return Ok(());
    };
    let claims = session.claims()?;
    println!("{} <{}>", user.name, user.email);
    if !claims.roles.is_empty() {
        println!("Roles:       {}", join(&claims.roles));
    }
    if !claims.permissions.is_empty() {
        println!("Permissions: {}", join(&claims.permissions));
    }
    if let Some(expires_at) = claims.expires_at {
        let state = if claims.is_expired() { "expired" } else { "expires" };
        println!("Token {} at {}", state, expires_at.to_rfc3339());
    }
    Ok(())
}

fn join<'a>(values: impl IntoIterator<Item = &'a String>) -> String {
    values.into_iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing argument <{}>", name))
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .with_context(|| format!("`{}` is not a number", raw))
}

/// `[page] [size] [search]`
fn page_request(args: &[String]) -> Result<PageRequest> {
    let mut request = PageRequest::default();
    if let Some(page) = args.first() {
        request.page_index = page.parse().with_context(|| format!("Invalid page `{}`", page))?;
    }
    if let Some(size) = args.get(1) {
        request.page_size = size.parse().with_context(|| format!("Invalid page size `{}`", size))?;
    }
    if let Some(term) = args.get(2) {
        request = request.search(term.clone());
    }
    Ok(request)
}

fn read_attachment(path: &Path) -> Result<ItemAttachment> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid file name {}", path.display()))?
        .to_string();
    Ok(ItemAttachment {
        file_name,
        content_type: None,
        data,
    })
}

fn prompt_line(prompt: &str) -> Result<String> {
    use std::io::Write;

    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let line = line.trim().to_string();
    if line.is_empty() {
        bail!("No input given");
    }
    Ok(line)
}

fn print_ack(ack: stockdesk_core::models::Ack, fallback: &str) {
    if ack.success {
        println!("{}", ack.message_or(fallback));
    } else {
        eprintln!("Failed: {}", ack.message_or("request was not accepted"));
    }
}
