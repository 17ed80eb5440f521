//! CLI `record` and `score` commands: ingest a turn, or score one without storing it.

use anyhow::Result;

use psyche::config::PsycheConfig;
use psyche::evolution::scorer::{self, TraitNudge};
use psyche::evolution::turns;
use psyche::evolution::types::NewTurn;

/// Store a turn through the live ingest path and report what it changed.
pub fn record(config: &PsycheConfig, turn: NewTurn) -> Result<()> {
    let mut conn = super::open_configured_db(config)?;
    let recorded = turns::record_turn(&mut conn, turn, &config.evolution)?;

    println!("Recorded turn #{}", recorded.turn.id);
    println!("  Importance:        {:.2}", recorded.turn.importance);
    println!("  Emotional weight:  {:.2}", recorded.turn.emotional_weight);
    println!("  Trait nudges:      {}", recorded.nudges_applied);
    for done in &recorded.completed_goals {
        println!("  Goal completed:    {}", done.completed.description);
        if let Some(ref next) = done.successor {
            println!("  New goal:          {}", next.description);
        }
    }
    Ok(())
}

/// Dry run: print the score and live nudges a turn would produce.
pub fn score(config: &PsycheConfig, turn: NewTurn) -> Result<()> {
    let score = scorer::score(&turn)?;
    println!("Weights version:     v{}", scorer::WEIGHTS_V1.version);
    println!("Importance:          {:.2}", score.importance);
    println!("Emotional weight:    {:.2}", score.emotional_weight);
    if let Some(topic) = scorer::classify_topic(&turn.content) {
        println!("Topic:               {topic}");
    }
    if let Some(phrase) = scorer::detect_correction(&turn.content) {
        println!("Correction:          \"{phrase}\"");
    }

    let nudges = scorer::turn_deltas(&turn, score, &config.evolution);
    if nudges.is_empty() {
        println!("Nudges:              (none)");
        return Ok(());
    }
    println!("Nudges:");
    for n in nudges {
        match n {
            TraitNudge::Shift { trait_id, delta } => {
                println!("  {:<16} {:+.4}", trait_id.as_str(), delta)
            }
            TraitNudge::Decay { trait_id, amount } => {
                println!("  {:<16} decay {:.4} toward {:.2}", trait_id.as_str(), amount, config.evolution.baseline)
            }
        }
    }
    Ok(())
}
