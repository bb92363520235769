//! Narrative text for gossip instances.
//!
//! The engine only talks to the [`Narrator`] capability. Two implementations
//! exist: [`TemplateNarrator`] is deterministic and always available, and
//! [`LiveNarrator`] asks an external [`NarrativeClient`] and falls back to the
//! template whenever the client errors, returns nothing, or runs over budget.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use thiserror::Error;

use crate::archetype_config::Archetype;
use crate::hashing::fingerprint;

const GENERIC_PHASE_LINES: &[&str] = &[
    "Word is quietly making the rounds.",
    "People have started to notice.",
    "It has become the talk of the mess hall.",
    "Nobody can quite agree on what really happened.",
];

#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("narrative service unavailable: {0}")]
    Unavailable(String),
    #[error("narrative service returned an empty response")]
    Empty,
}

/// Everything a narrator needs to describe one instance in one phase.
#[derive(Debug, Clone)]
pub struct NarrativeRequest<'a> {
    pub archetype: &'a Archetype,
    pub phase: &'a str,
    /// Role label to display name.
    pub subjects: BTreeMap<String, String>,
    /// Stable per-instance salt so fallback lines vary between instances.
    pub salt: u64,
}

/// The external text generator.
pub trait NarrativeClient: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, NarrativeError>;
}

/// Capability the engine uses to describe instances. Never fails.
pub trait Narrator: Send + Sync {
    fn narrate(&self, request: &NarrativeRequest<'_>) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateNarrator;

impl Narrator for TemplateNarrator {
    fn narrate(&self, request: &NarrativeRequest<'_>) -> String {
        fallback_text(request)
    }
}

/// Deterministic text keyed by archetype, phase, and the request salt.
pub fn fallback_text(request: &NarrativeRequest<'_>) -> String {
    let archetype = request.archetype;
    let headline = archetype.render_template(&request.subjects);
    let detail = match archetype.fallback_narratives.get(request.phase) {
        Some(line) => archetype.render_template_line(line, &request.subjects),
        None => {
            let key = fingerprint(&(archetype.id.as_str(), request.phase, request.salt));
            GENERIC_PHASE_LINES[(key % GENERIC_PHASE_LINES.len() as u64) as usize].to_string()
        }
    };
    if headline.is_empty() {
        detail
    } else {
        format!("{headline}. {detail}")
    }
}

/// Build the prompt handed to a live client.
pub fn build_prompt(request: &NarrativeRequest<'_>) -> String {
    let archetype = request.archetype;
    let mut prompt = format!(
        "Describe the current state of the shipboard gossip \"{}\" in one or two sentences.\n",
        archetype.name
    );
    prompt.push_str(&format!("Phase: {}\n", request.phase));
    for (role, name) in &request.subjects {
        prompt.push_str(&format!("{role}: {name}\n"));
    }
    if !archetype.llm_hooks.behaviors.is_empty() {
        prompt.push_str(&format!(
            "Typical behaviors: {}\n",
            archetype.llm_hooks.behaviors.join("; ")
        ));
    }
    if !archetype.llm_hooks.complications.is_empty() {
        prompt.push_str(&format!(
            "Possible complications: {}\n",
            archetype.llm_hooks.complications.join("; ")
        ));
    }
    prompt
}

/// Narrator backed by a [`NarrativeClient`].
///
/// Each call runs on its own worker thread and the caller waits at most
/// `budget` for the answer. A late answer is dropped once it arrives.
pub struct LiveNarrator {
    client: Arc<dyn NarrativeClient>,
    budget: Duration,
    fallback: TemplateNarrator,
}

impl LiveNarrator {
    pub fn new(client: Box<dyn NarrativeClient>, budget: Duration) -> Self {
        Self {
            client: Arc::from(client),
            budget,
            fallback: TemplateNarrator,
        }
    }

    fn fall_back(&self, request: &NarrativeRequest<'_>, reason: &dyn std::fmt::Display) -> String {
        tracing::warn!(
            target: "gossip_sim::narrative",
            archetype = %request.archetype.id,
            phase = request.phase,
            %reason,
            "narrative.fallback"
        );
        self.fallback.narrate(request)
    }
}

impl Narrator for LiveNarrator {
    fn narrate(&self, request: &NarrativeRequest<'_>) -> String {
        let prompt = build_prompt(request);
        let client = Arc::clone(&self.client);
        let (tx, rx) = crossbeam_channel::bounded(1);
        let spawned = thread::Builder::new()
            .name("gossip-narrative".to_string())
            .spawn(move || {
                // receiver may have given up already
                let _ = tx.send(client.generate(&prompt));
            });
        if let Err(err) = spawned {
            return self.fall_back(request, &err);
        }

        match rx.recv_timeout(self.budget) {
            Ok(Ok(text)) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(Ok(_)) => self.fall_back(request, &NarrativeError::Empty),
            Ok(Err(err)) => self.fall_back(request, &err),
            Err(RecvTimeoutError::Timeout) => self.fall_back(
                request,
                &format!("no response within {:?}", self.budget),
            ),
            Err(RecvTimeoutError::Disconnected) => self.fall_back(
                request,
                &NarrativeError::Unavailable("client thread exited".to_string()),
            ),
        }
    }
}

/// Pick the live narrator when a client is available, otherwise the template.
pub fn narrator_for(client: Option<Box<dyn NarrativeClient>>, budget: Duration) -> Box<dyn Narrator> {
    match client {
        Some(client) => Box::new(LiveNarrator::new(client, budget)),
        None => Box::new(TemplateNarrator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype_config::ArchetypeCatalog;

    struct FixedClient(Result<&'static str, ()>);

    impl NarrativeClient for FixedClient {
        fn generate(&self, _prompt: &str) -> Result<String, NarrativeError> {
            self.0
                .map(str::to_string)
                .map_err(|_| NarrativeError::Unavailable("offline".to_string()))
        }
    }

    struct SlowClient(Duration);

    impl NarrativeClient for SlowClient {
        fn generate(&self, _prompt: &str) -> Result<String, NarrativeError> {
            thread::sleep(self.0);
            Ok("far too late".to_string())
        }
    }

    fn subjects() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("subject_a".to_string(), "Mira".to_string()),
            ("subject_b".to_string(), "Tomas".to_string()),
        ])
    }

    #[test]
    fn fallback_is_deterministic() {
        let catalog = ArchetypeCatalog::builtin();
        let archetype = catalog.archetype("secret_crush").unwrap();
        let request = NarrativeRequest {
            archetype,
            phase: "CRUSH",
            subjects: subjects(),
            salt: 4,
        };
        assert_eq!(fallback_text(&request), fallback_text(&request));
        insta::assert_snapshot!(
            TemplateNarrator.narrate(&request),
            @"Mira has a crush on Tomas. Mira keeps finding excuses to stop by Tomas's station."
        );
    }

    #[test]
    fn phase_without_line_uses_generic_text() {
        let catalog = ArchetypeCatalog::builtin();
        let archetype = catalog.archetype("secret_crush").unwrap();
        let request = NarrativeRequest {
            archetype,
            phase: "FORGOTTEN",
            subjects: subjects(),
            salt: 9,
        };
        let text = fallback_text(&request);
        assert!(text.starts_with("Mira has a crush on Tomas. "));
        assert!(GENERIC_PHASE_LINES.iter().any(|line| text.ends_with(line)));
        assert_eq!(text, TemplateNarrator.narrate(&request));
    }

    #[test]
    fn live_narrator_uses_client_text() {
        let catalog = ArchetypeCatalog::builtin();
        let archetype = catalog.archetype("secret_crush").unwrap();
        let request = NarrativeRequest {
            archetype,
            phase: "OBVIOUS",
            subjects: subjects(),
            salt: 1,
        };
        let narrator = narrator_for(
            Some(Box::new(FixedClient(Ok("  Everyone saw the blush.  ")))),
            Duration::from_secs(5),
        );
        assert_eq!(narrator.narrate(&request), "Everyone saw the blush.");
    }

    #[test]
    fn live_narrator_falls_back_on_failure_or_empty_text() {
        let catalog = ArchetypeCatalog::builtin();
        let archetype = catalog.archetype("secret_crush").unwrap();
        let request = NarrativeRequest {
            archetype,
            phase: "OBVIOUS",
            subjects: subjects(),
            salt: 1,
        };
        let expected = fallback_text(&request);

        let failing = LiveNarrator::new(Box::new(FixedClient(Err(()))), Duration::from_secs(5));
        assert_eq!(failing.narrate(&request), expected);

        let empty = LiveNarrator::new(Box::new(FixedClient(Ok("   "))), Duration::from_secs(5));
        assert_eq!(empty.narrate(&request), expected);
    }

    #[test]
    fn prompt_carries_hooks_and_subjects() {
        let catalog = ArchetypeCatalog::builtin();
        let archetype = catalog.archetype("secret_crush").unwrap();
        let request = NarrativeRequest {
            archetype,
            phase: "CRUSH",
            subjects: subjects(),
            salt: 0,
        };
        let prompt = build_prompt(&request);
        assert!(prompt.contains("Phase: CRUSH"));
        assert!(prompt.contains("subject_a: Mira"));
        assert!(prompt.contains(&archetype.llm_hooks.behaviors[0]));
    }

    #[test]
    fn slow_client_is_cut_off_at_the_budget() {
        let catalog = ArchetypeCatalog::builtin();
        let archetype = catalog.archetype("secret_crush").unwrap();
        let request = NarrativeRequest {
            archetype,
            phase: "OBVIOUS",
            subjects: subjects(),
            salt: 1,
        };
        let narrator = LiveNarrator::new(
            Box::new(SlowClient(Duration::from_millis(1500))),
            Duration::from_millis(10),
        );

        let started = std::time::Instant::now();
        let text = narrator.narrate(&request);
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(text, fallback_text(&request));
    }
}
