mod config;
mod error;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone, Utc};
use clap::{Parser, Subcommand};
use policy::{Authorizer, Decision, Requirement, Resource, ResourceId};
use serde::Serialize;
use storage::Store;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "gatehouse.toml";

#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(about = "Role-based access control for the content site", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file (defaults to ./gatehouse.toml if present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create roles and converge their capability sets
    Seed,
    /// List every known capability
    Catalog,
    /// List roles and their capabilities
    Roles,
    /// List all users
    Users,
    /// Manage a user
    User {
        #[command(subcommand)]
        action: UserCommand,
    },
    /// Manage resources
    Resource {
        #[command(subcommand)]
        action: ResourceCommand,
    },
    /// Check whether a user may do something
    Check {
        /// Username
        user: String,
        /// Capability token, e.g. publish_article
        #[arg(conflicts_with = "guard")]
        capability: Option<String>,
        /// Named guard from the configuration, e.g. article_edit
        #[arg(short, long)]
        guard: Option<String>,
        /// Resource ID for ownership checks
        #[arg(short, long)]
        resource: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create a user holding the default role
    Add {
        username: String,
        #[arg(long)]
        superuser: bool,
        #[arg(long)]
        staff: bool,
    },
    /// Add a user to a role
    Grant { username: String, role: String },
    /// Remove a user from a role
    Revoke { username: String, role: String },
    /// Show a user's roles and effective capabilities
    Show { username: String },
}

#[derive(Subcommand)]
enum ResourceCommand {
    /// Register a resource instance
    Add {
        /// Resource type, e.g. article
        kind: String,
        title: String,
        /// Owning username
        #[arg(short, long)]
        owner: Option<String>,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.logging.level);

    let json = cli.json;
    match cli.command {
        Commands::Seed => cmd_seed(&config, json),
        Commands::Catalog => cmd_catalog(&config, json),
        Commands::Roles => cmd_roles(&config, json),
        Commands::Users => cmd_users(&config, json),
        Commands::User { action } => match action {
            UserCommand::Add {
                username,
                superuser,
                staff,
            } => cmd_user_add(&config, &username, superuser, staff),
            UserCommand::Grant { username, role } => cmd_user_grant(&config, &username, &role),
            UserCommand::Revoke { username, role } => cmd_user_revoke(&config, &username, &role),
            UserCommand::Show { username } => cmd_user_show(&config, &username, json),
        },
        Commands::Resource { action } => match action {
            ResourceCommand::Add { kind, title, owner } => {
                cmd_resource_add(&config, &kind, &title, owner.as_deref())
            }
        },
        Commands::Check {
            user,
            capability,
            guard,
            resource,
        } => cmd_check(
            &config,
            &user,
            capability.as_deref(),
            guard.as_deref(),
            resource.as_deref(),
            json,
        ),
    }
}

fn cmd_seed(config: &Config, json: bool) -> Result<()> {
    let db_path = config.database_path()?;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut store = Store::open(&db_path)?;

    // Resolve everything, including capabilities from earlier runs, before
    // writing any role.
    let plan = config.bootstrap.plan_with(&store.load_catalog()?)?;
    let report = plan.apply(&mut store)?;

    if json {
        return print_json(&report);
    }

    println!("Seeding roles in {}", db_path.display());
    for role in &report.roles {
        if role.created {
            println!("Created role: {}", role.name);
        } else {
            println!("Role already exists: {}", role.name);
        }
        println!(
            "  assigned {} capabilities to {}",
            role.capabilities, role.name
        );
    }
    println!("Seeded {} roles.", report.roles.len());
    Ok(())
}

fn cmd_catalog(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let catalog = store.load_catalog()?;

    if json {
        return print_json(&catalog.entries().collect::<Vec<_>>());
    }
    if catalog.is_empty() {
        println!("No capabilities found.");
        return Ok(());
    }

    println!("{:<28}  {:<10}  DESCRIPTION", "CAPABILITY", "RESOURCE");
    println!("{}", "-".repeat(72));
    for entry in catalog.entries() {
        println!(
            "{:<28}  {:<10}  {}",
            entry.capability, entry.resource, entry.description
        );
    }
    Ok(())
}

fn cmd_roles(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let registry = store.load_registry()?;

    if json {
        let roles: Vec<_> = registry
            .roles()
            .map(|(name, role)| {
                serde_json::json!({
                    "name": name,
                    "description": role.description,
                    "capabilities": role.capabilities,
                })
            })
            .collect();
        return print_json(&roles);
    }

    for (name, role) in registry.roles() {
        println!("{name} ({} capabilities)", role.capabilities.len());
        if !role.description.is_empty() {
            println!("  {}", role.description);
        }
        for capability in &role.capabilities {
            println!("    {capability}");
        }
    }
    Ok(())
}

fn cmd_users(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let users = store.list_principals()?;

    if json {
        return print_json(&users);
    }
    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }

    println!(
        "{:<20}  {:<16}  {:<5}  {:<5}  ROLES",
        "USERNAME", "CREATED", "SUPER", "STAFF"
    );
    println!("{}", "-".repeat(80));
    for record in users {
        let p = &record.principal;
        let roles: Vec<_> = p.roles.iter().map(String::as_str).collect();
        println!(
            "{:<20}  {:<16}  {:<5}  {:<5}  {}",
            p.username,
            local_time(&record.created_at),
            yes_no(p.is_superuser),
            yes_no(p.is_staff),
            roles.join(", ")
        );
    }
    Ok(())
}

fn cmd_user_add(config: &Config, username: &str, superuser: bool, staff: bool) -> Result<()> {
    let store = open_store(config)?;
    let principal = store.create_principal(username, superuser, staff)?;
    println!("Created user {} ({})", principal.username, principal.id);
    Ok(())
}

fn cmd_user_grant(config: &Config, username: &str, role: &str) -> Result<()> {
    let store = open_store(config)?;
    if store.assign_role(username, role)? {
        println!("Added {username} to {role}");
    } else {
        println!("{username} is already in {role}");
    }
    Ok(())
}

fn cmd_user_revoke(config: &Config, username: &str, role: &str) -> Result<()> {
    let store = open_store(config)?;
    if store.revoke_role(username, role)? {
        println!("Removed {username} from {role}");
    } else {
        println!("{username} is not in {role}");
    }
    Ok(())
}

/// Guards that need no resource, evaluated for the dashboard view.
#[derive(Serialize)]
struct GuardStatus<'a> {
    guard: &'a str,
    allowed: bool,
}

fn cmd_user_show(config: &Config, username: &str, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let principal = store.find_principal(username)?;
    let registry = store.load_registry()?;
    let auth = Authorizer::new(&registry);

    let capabilities = auth.effective_capabilities(&principal);
    let guards: Vec<_> = config
        .bootstrap
        .guards
        .iter()
        .filter(|(_, requirement)| !requirement.needs_resource())
        .map(|(name, requirement)| GuardStatus {
            guard: name,
            allowed: auth.satisfies(&principal, requirement, None),
        })
        .collect();

    if json {
        return print_json(&serde_json::json!({
            "user": principal,
            "capabilities": capabilities,
            "guards": guards,
        }));
    }

    println!("User:       {}", principal.username);
    println!("ID:         {}", principal.id);
    println!("Superuser:  {}", yes_no(principal.is_superuser));
    println!("Staff:      {}", yes_no(principal.is_staff));
    let roles: Vec<_> = principal.roles.iter().map(String::as_str).collect();
    println!("Roles:      {}", roles.join(", "));
    println!("\nCapabilities ({}):", capabilities.len());
    for capability in &capabilities {
        println!("  {capability}");
    }
    println!("\nGuards:");
    for status in &guards {
        println!("  {:<24} {}", status.guard, if status.allowed { "allowed" } else { "denied" });
    }
    Ok(())
}

fn cmd_resource_add(config: &Config, kind: &str, title: &str, owner: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    if !config.bootstrap.catalog().has_resource(kind) {
        return Err(Error::InvalidArgument(format!("unknown resource type '{kind}'")));
    }

    let owner = owner
        .map(|username| store.find_principal(username).map(|p| p.id))
        .transpose()?;
    let record = store.create_resource(kind, title, owner)?;
    println!("Created {} {} ({})", record.kind, record.id, record.title);
    Ok(())
}

fn cmd_check(
    config: &Config,
    username: &str,
    capability: Option<&str>,
    guard: Option<&str>,
    resource: Option<&str>,
    json: bool,
) -> Result<()> {
    let requirement = match (capability, guard) {
        (Some(capability), None) => Requirement::capability(capability),
        (None, Some(guard)) => config.bootstrap.guard(guard)?.clone(),
        _ => {
            return Err(Error::InvalidArgument(
                "give either a capability or --guard".to_string(),
            ));
        }
    };

    let store = open_store(config)?;
    let principal = store.find_principal(username)?;
    let registry = store.load_registry()?;
    let resource = resource
        .map(|id| load_resource(&store, id))
        .transpose()?;

    if requirement.needs_resource() && resource.is_none() {
        tracing::warn!(%requirement, "no resource given, ownership cannot match");
    }

    let decision = Authorizer::new(&registry).check(&principal, &requirement, resource.as_ref());

    if json {
        let (allowed, reason) = match &decision {
            Decision::Allow => (true, None),
            Decision::Deny { reason } => (false, Some(reason.as_str())),
        };
        print_json(&serde_json::json!({
            "user": principal.username,
            "requirement": requirement.to_string(),
            "allowed": allowed,
            "reason": reason,
        }))?;
    } else {
        println!("{}", decision_line(&principal.username, &requirement, &decision));
    }

    match decision {
        Decision::Allow => Ok(()),
        Decision::Deny { reason } => Err(policy::Error::Denied(reason).into()),
    }
}

fn decision_line(username: &str, requirement: &Requirement, decision: &Decision) -> String {
    match decision {
        Decision::Allow => format!("allowed: {username} satisfies {requirement}"),
        Decision::Deny { reason } => format!("denied: {reason}"),
    }
}

fn load_resource(store: &Store, id: &str) -> Result<Resource> {
    let id = id
        .parse::<uuid::Uuid>()
        .map_err(|e| Error::InvalidArgument(format!("invalid resource id '{id}': {e}")))?;
    Ok(store.find_resource(ResourceId(id))?.as_resource())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None if Path::new(CONFIG_FILE).exists() => Ok(Config::load(CONFIG_FILE)?),
        None => Ok(Config::default_config()),
    }
}

fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(config: &Config) -> Result<Store> {
    let db_path = config.database_path()?;

    if !db_path.exists() {
        return Err(Error::DatabaseNotFound { path: db_path });
    }

    Ok(Store::open(&db_path)?)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn local_time(timestamp: &DateTime<Utc>) -> String {
    Local
        .from_utc_datetime(&timestamp.naive_utc())
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_line_reports_denial() {
        let requirement = Requirement::capability("publish_article");
        let denied = Decision::Deny {
            reason: "mia does not satisfy publish_article".to_string(),
        };
        assert_eq!(
            decision_line("mia", &requirement, &denied),
            "denied: mia does not satisfy publish_article"
        );
        assert_eq!(
            decision_line("sam", &requirement, &Decision::Allow),
            "allowed: sam satisfies publish_article"
        );
    }
}
