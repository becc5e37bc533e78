use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use titration_core::*;

#[derive(Parser)]
#[command(name = "titrate")]
#[command(about = "Medication titration decision support", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Protocol file (defaults to the configured or built-in protocol)
    #[arg(long, global = true)]
    protocol: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a patient record and recommend the next action
    Evaluate {
        /// Patient record (JSON)
        #[arg(long)]
        patient: PathBuf,

        /// File an adverse reaction with this description when recommended,
        /// and save the patient record
        #[arg(long)]
        report_reaction: Option<String>,

        /// Print the evaluation as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the dosing ladder
    Ladder,

    /// Check that a protocol loads
    Validate,
}

fn main() -> Result<()> {
    // Initialize logging
    titration_core::logging::init_with_level("warn");

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let protocol = config.resolve_protocol(cli.protocol.as_deref())?;

    match cli.command {
        Commands::Evaluate {
            patient,
            report_reaction,
            json,
        } => cmd_evaluate(&protocol, &patient, report_reaction.as_deref(), json),
        Commands::Ladder => {
            display_ladder(&protocol);
            Ok(())
        }
        Commands::Validate => cmd_validate(&protocol),
    }
}

fn cmd_evaluate(
    protocol: &Protocol,
    patient_path: &Path,
    report_reaction: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut patient = Patient::load(patient_path)?;

    let (current_medication, evaluation) = {
        let titrator = Titrator::new(protocol, &patient)?;
        (titrator.current_medication().cloned(), titrator.evaluate()?)
    };

    if json {
        display_json(protocol, current_medication.as_ref(), &evaluation)?;
    } else {
        display_evaluation(protocol, current_medication.as_ref(), &evaluation)?;
    }

    let Some(description) = report_reaction else {
        return Ok(());
    };

    let mut filed = 0;
    for action in &evaluation.recommended_actions {
        let reaction = match action.perform_with(&mut patient, description) {
            Ok(reaction) => reaction,
            // Nothing to file against without a current medication
            Err(Error::NoCurrentMedication(_)) => None,
            Err(e) => return Err(e),
        };
        if let Some(reaction) = reaction {
            if !json {
                println!("\n✓ Filed adverse reaction to {}", reaction.ingredient);
            }
            filed += 1;
        }
    }

    if filed > 0 {
        patient.save(patient_path)?;
    } else if !json {
        println!("\nNo adverse reaction recommended - record unchanged.");
    }

    Ok(())
}

fn cmd_validate(protocol: &Protocol) -> Result<()> {
    let rule_count = protocol.rule_count()?;

    println!(
        "✓ Protocol '{}' is valid: {} medications, {} steps each, {} rules",
        protocol.name,
        protocol.ladder.subladders().len(),
        protocol.ladder.step_count(),
        rule_count
    );
    Ok(())
}

/// Suggestion text that tolerates a missing current medication
fn suggestion(action: &Action) -> Result<String> {
    match action.suggest() {
        Err(Error::NoCurrentMedication(kind)) => {
            Ok(format!("{} (no current medication)", kind))
        }
        other => other,
    }
}

fn display_evaluation(
    protocol: &Protocol,
    current_medication: Option<&Medication>,
    evaluation: &Evaluation,
) -> Result<()> {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {}", protocol.name.to_uppercase());
    println!("╰─────────────────────────────────────────╯");
    println!();

    match current_medication {
        Some(medication) => println!("  Titrating: {}", medication),
        None => println!("  Initiating"),
    }
    println!();

    if evaluation.can_advance {
        println!("  No limiting rules satisfied");
    } else {
        println!("  Satisfied rules:");
        for rule in &evaluation.satisfied_rules {
            println!("    • {}", rule.label());
        }
    }
    println!();

    println!("  Recommended:");
    for action in &evaluation.recommended_actions {
        println!("  → {}", suggestion(action)?);

        let buttons = action.buttons();
        if !buttons.is_empty() {
            let options: Vec<String> = buttons.iter().map(|m| m.to_string()).collect();
            println!("    Options: {}", options.join(" | "));
        }
    }

    println!();
    Ok(())
}

fn display_json(
    protocol: &Protocol,
    current_medication: Option<&Medication>,
    evaluation: &Evaluation,
) -> Result<()> {
    let actions = evaluation
        .recommended_actions
        .iter()
        .map(|action| {
            Ok(json!({
                "action": action.kind(),
                "suggestion": suggestion(action)?,
                "options": action.buttons().iter().map(|m| m.to_string()).collect::<Vec<_>>(),
            }))
        })
        .collect::<Result<Vec<_>>>()?;

    let output = json!({
        "protocol": protocol.name,
        "current_medication": current_medication.map(|m| m.to_string()),
        "can_advance": evaluation.can_advance,
        "satisfied_rules": evaluation.satisfied_rules.iter().map(|r| r.label()).collect::<Vec<_>>(),
        "recommended_actions": actions,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn display_ladder(protocol: &Protocol) {
    println!("{}", protocol.name);
    if let Some(class) = protocol.ladder.drug_class() {
        println!("  Class: {}", class);
    }
    println!();

    for subladder in protocol.ladder.subladders() {
        let steps: Vec<String> = subladder.steps.iter().map(|m| m.dose.to_string()).collect();
        println!("  {:<14} {}", subladder.name, steps.join(" → "));
    }
}
