use clap::{Parser, Subcommand};
use std::{rc::Rc, sync::Arc};

use roteiro::editor::{EditorRegistry, FieldId, HttpContentGateway, MemoryNode, SaveOutcome};

#[derive(Parser)]
#[command(name = "roteiro-edit")]
#[command(about = "Edit site copy on a running Roteiro server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every stored field of a page
    Show {
        #[arg(short, long)]
        path: String,
    },
    /// Replace fields of a page in one batch
    Set {
        #[arg(short, long)]
        path: String,
        #[arg(short, long, env = "ROTEIRO_EMAIL")]
        email: String,
        #[arg(long, env = "ROTEIRO_PASSWORD")]
        password: String,
        /// `key=content`, repeatable
        #[arg(short, long = "field", required = true, value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, content)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), content.to_string()))
        }
        _ => Err(format!("expected key=content, got `{}`", raw)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let gateway = Arc::new(HttpContentGateway::new(&cli.url)?);

    match cli.command {
        Commands::Show { path } => {
            let mut registry = EditorRegistry::new(gateway);
            let fields = registry.load_page(&path).await?;
            if fields.is_empty() {
                println!("No fields stored for {}", path);
            }
            for (id, content) in fields {
                println!("{} = {}", id.key, content);
            }
        }
        Commands::Set {
            path,
            email,
            password,
            fields,
        } => {
            let user = gateway.login(&email, &password).await?;
            println!("Logged in as {}", user.email);

            let mut registry = EditorRegistry::new(gateway.clone());
            registry.load_page(&path).await?;

            // Mount every requested field on a headless node holding the stored copy
            let mut nodes = Vec::with_capacity(fields.len());
            for (key, content) in fields {
                let id = FieldId::new(&path, &key);
                let node = MemoryNode::new(registry.cached(&id).unwrap_or_default());
                registry.register_field(id, Rc::new(node.clone()), Box::new(|_: &str| {}));
                nodes.push((node, content));
            }

            registry.enable_editing();
            for (node, content) in &nodes {
                node.type_text(content);
            }

            let outcome = registry.save().await;
            if let Err(e) = gateway.logout().await {
                log::warn!("logout failed: {}", e);
            }

            match outcome {
                SaveOutcome::Saved(saved) => {
                    for field in saved {
                        println!("saved {} at {}", field.id, field.updated_at);
                    }
                }
                SaveOutcome::NothingToSave => println!("Nothing to save"),
                SaveOutcome::Failed(message) => {
                    eprintln!("Save failed: {}", message);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
