//! Wizard-game demo: a chat session where the model can act on the game
//! world through registered commands.
//!
//! Requires `OPENAI_API_KEY` (or an api_key in `~/.gpt-commands/config.yaml`).

use std::io::Write;
use std::sync::{Arc, Mutex};

use clap::Parser;
use console::style;
use futures::{StreamExt, pin_mut};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use gpt_commands::{
    ClientConfig, CommandArgs, FunctionRegistry, GptCommandsClient, ParamType, RecordType,
};

const SYSTEM_PROMPT: &str = "You are Harry Potter, a wizard living in the Wizarding World. \
You're in a dangerous place along with your friend Neville. \
You're talking to Neville as Harry and never break the character.";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Sampling temperature
    #[arg(short, long)]
    temperature: Option<f32>,
}

fn point_type() -> RecordType {
    RecordType::new("Point")
        .with_description("A 2D point")
        .field("x", ParamType::Number)
        .field("y", ParamType::Number)
}

fn marker_type() -> RecordType {
    RecordType::new("Marker")
        .with_description("A marker on the map")
        .field("name", ParamType::String)
        .field("point", ParamType::Record(point_type()))
}

fn build_registry(
    markers: Arc<Mutex<Vec<Value>>>,
) -> Result<FunctionRegistry, gpt_commands::GptError> {
    let markers_for_get = markers.clone();

    FunctionRegistry::builder()
        .function("get_inventory", "Get inventory of a character")
        .param(
            "character",
            ParamType::String,
            "The name of the character to get the inventory of. One of: 'Harry', 'Ron', 'Hermione'",
        )
        .optional_param(
            "max_items",
            ParamType::Integer,
            json!(10),
            "The maximum number of items to return",
        )
        .returning(|args: CommandArgs| async move {
            let character = args["character"].as_str().unwrap_or_default().to_string();
            let max_items = args["max_items"].as_u64().unwrap_or(10) as usize;
            let inventory: Vec<&str> = match character.as_str() {
                "Harry" => vec!["Wand", "Broom", "Cloak"],
                "Ron" => vec!["Wand", "Rat"],
                "Hermione" => vec!["Wand", "Cat", "Book"],
                _ => vec![],
            };
            Ok(Some(json!(
                inventory.into_iter().take(max_items).collect::<Vec<_>>()
            )))
        })
        .function("alohomora", "Unlock the door")
        .handler(|_args| async {
            println!("\n{}", style("[COMMAND] Alohomora!").bold().magenta());
            Ok(None)
        })
        .function("expelliarmus", "Disarm the target")
        .param("target", ParamType::String, "The target to disarm")
        .handler(|args: CommandArgs| async move {
            let target = args["target"].as_str().unwrap_or_default().to_string();
            println!(
                "\n{}",
                style(format!("[COMMAND] Expelliarmus {}!", target))
                    .bold()
                    .magenta()
            );
            Ok(None)
        })
        .function("get_location_coordinates", "Get the coordinates of a location")
        .optional_param(
            "location",
            ParamType::optional(ParamType::String),
            json!(null),
            "The location to get the coordinates of. One of: 'Hogwarts', 'Diagon Alley', \
             'Forbidden Forest'. If omitted, defaults to the current location.",
        )
        .returning(|args: CommandArgs| async move {
            let location = args["location"].as_str().unwrap_or_default().to_string();
            let point = match location.as_str() {
                "Hogwarts" => json!({"x": 0.0, "y": 0.0}),
                "Diagon Alley" => json!({"x": 1.0, "y": 1.0}),
                "Forbidden Forest" => json!({"x": 2.0, "y": 2.0}),
                _ => json!({"x": 100.0, "y": 100.0}),
            };
            Ok(Some(point))
        })
        .function("get_markers", "Get the markers on the map")
        .returning(move |_args| {
            let markers = markers_for_get.clone();
            async move {
                let markers = markers.lock().unwrap().clone();
                Ok(Some(json!(markers)))
            }
        })
        .function("set_a_mark_on_the_map", "Set a mark on the map")
        .param("marker", ParamType::Record(marker_type()), "The mark to set")
        .handler(move |args: CommandArgs| {
            let markers = markers.clone();
            async move {
                let marker = args["marker"].clone();
                println!(
                    "\n{}",
                    style(format!("[COMMAND] Set a mark on the map: {}", marker))
                        .bold()
                        .magenta()
                );
                markers.lock().unwrap().push(marker);
                Ok(None)
            }
        })
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = ClientConfig::load()?;
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(temperature) = args.temperature {
        config.temperature = temperature;
    }

    let markers = Arc::new(Mutex::new(Vec::new()));
    let registry = build_registry(markers)?;
    let mut client = GptCommandsClient::new(config, SYSTEM_PROMPT)?;

    println!("Talk to Harry. Press Ctrl+D to leave.");
    let mut editor = rustyline::DefaultEditor::new()?;

    loop {
        let line = match editor.readline(&style("You: ").bold().cyan().to_string()) {
            Ok(line) => line,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        editor.add_history_entry(&line)?;

        let stream = client.chat_stream(line, &registry);
        pin_mut!(stream);
        while let Some(fragment) = stream.next().await {
            match fragment {
                Ok(text) => {
                    print!("{}", text);
                    std::io::stdout().flush()?;
                }
                Err(err) => {
                    eprintln!("\n{}", style(format!("error: {}", err)).red());
                    break;
                }
            }
        }
        println!();
    }

    Ok(())
}
