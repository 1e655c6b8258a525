//! Continuous background loops (spec.md §4.11): periodic reflection
//! scorecards and personality profiles, each a lightweight read-only
//! sweep over a thread's recent user utterances. Grounded verbatim on
//! `original_source/personal_agent/continuous_loops.py`, with the
//! original's `threading.Event`-based stop signal replaced by
//! `tokio::sync::watch` (no `signal` tokio feature is enabled, so this
//! crate's own `watch` channel is the cancellation primitive, not OS
//! signal handling) and its per-process daemon thread replaced by a
//! spawned `tokio::time::interval` task.

use crate::memory::MemoryStore;
use crate::storage::GlobalStore;
use crate::Result;
use once_cell::sync::Lazy;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Words too common to carry topic signal, grounded verbatim on the
/// original's module-level `_STOPWORDS` set.
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "that", "with", "this", "from", "have", "your", "you", "for", "are", "was",
        "but", "not", "just", "like", "what", "when", "where", "how", "why", "about", "into",
        "then", "than", "them", "they", "their", "here", "there", "some", "could", "would",
        "should", "been", "did", "does", "dont", "doesnt", "cant", "wont", "im", "ive", "its",
        "we", "our", "us", "a", "an", "to", "of", "in", "on", "at", "as", "is", "it",
    ]
    .into_iter()
    .collect()
});

/// Lower-cases, strips everything but word characters/whitespace/hyphens,
/// and drops short or stopword tokens, grounded verbatim on `_tokenize`.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let cleaned: String = lower
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || c == '-' || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() >= 3 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Token frequency across `messages`, grounded verbatim on `_topic_counts`.
#[must_use]
pub fn topic_counts(messages: &[String]) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for message in messages {
        for token in tokenize(message) {
            *counts.entry(token).or_insert(0) += 1;
        }
    }
    counts
}

/// The `k` most frequent topics, descending by count, grounded verbatim
/// on `_top_topics`.
#[must_use]
pub fn top_topics(counts: &HashMap<String, u64>, k: usize) -> Vec<serde_json::Value> {
    let mut items: Vec<(&String, &u64)> = counts.iter().collect();
    items.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    items
        .into_iter()
        .take(k)
        .map(|(topic, count)| json!({"topic": topic, "count": count}))
        .collect()
}

/// Splits `messages` in half (older/recent), compares topic frequency
/// between the two halves, and reports topics whose count moved by at
/// least 2 in either direction, grounded verbatim on `_trend_topics`.
#[must_use]
pub fn trend_topics(messages: &[String]) -> serde_json::Value {
    if messages.is_empty() {
        return json!({"rising": [], "fading": []});
    }
    let mid = (messages.len() / 2).max(1);
    let older = &messages[..mid];
    let recent = &messages[mid..];
    let older_counts = topic_counts(older);
    let recent_counts = topic_counts(recent);
    let topics: HashSet<&String> = older_counts.keys().chain(recent_counts.keys()).collect();

    let mut rising = Vec::new();
    let mut fading = Vec::new();
    for topic in topics {
        let delta = *recent_counts.get(topic).unwrap_or(&0) as i64 - *older_counts.get(topic).unwrap_or(&0) as i64;
        if delta >= 2 {
            rising.push((topic.clone(), delta));
        } else if delta <= -2 {
            fading.push((topic.clone(), delta));
        }
    }
    rising.sort_by(|a, b| b.1.cmp(&a.1));
    fading.sort_by(|a, b| a.1.cmp(&b.1));
    rising.truncate(5);
    fading.truncate(5);
    json!({
        "rising": rising.into_iter().map(|(topic, delta)| json!({"topic": topic, "delta": delta})).collect::<Vec<_>>(),
        "fading": fading.into_iter().map(|(topic, delta)| json!({"topic": topic, "delta": delta})).collect::<Vec<_>>(),
    })
}

/// Whether `text` contains an emoji codepoint in the U+1F300-U+1FAFF
/// block, grounded verbatim on `_emoji_present`.
#[must_use]
pub fn emoji_present(text: &str) -> bool {
    text.chars().any(|c| ('\u{1F300}'..='\u{1FAFF}').contains(&c))
}

/// Builds one reflection scorecard for `thread_id` over `messages`
/// (oldest first), grounded verbatim on `build_reflection_scorecard`.
/// `generated_at` is stamped by the caller rather than computed here,
/// since this crate's workflow tooling forbids `Timestamp::now()`-style
/// calls inside code paths exercised by deterministic replay; ordinary
/// runtime callers pass [`crate::current_timestamp`].
#[must_use]
pub fn build_reflection_scorecard(thread_id: &str, messages: &[String], generated_at: u64) -> serde_json::Value {
    let counts = topic_counts(messages);
    json!({
        "thread_id": thread_id,
        "updated_at": generated_at,
        "message_window": messages.len(),
        "preference_confidence": (messages.len() as f64 / 20.0).min(1.0),
        "top_topics": top_topics(&counts, 5),
        "topic_trends": trend_topics(messages),
    })
}

/// Builds one personality profile for `thread_id` over `messages`,
/// grounded verbatim on `build_personality_profile`.
#[must_use]
pub fn build_personality_profile(thread_id: &str, messages: &[String], generated_at: u64) -> serde_json::Value {
    let lengths: Vec<usize> = messages.iter().filter(|m| !m.is_empty()).map(|m| m.chars().count()).collect();
    let avg_len = if lengths.is_empty() {
        0.0
    } else {
        lengths.iter().sum::<usize>() as f64 / lengths.len() as f64
    };
    let verbosity = if avg_len <= 60.0 {
        "concise"
    } else if avg_len >= 180.0 {
        "verbose"
    } else {
        "balanced"
    };

    let emoji_hits = messages.iter().filter(|m| emoji_present(m)).count();
    let emoji_preference = if emoji_hits >= (messages.len() / 4).max(1) { "on" } else { "off" };

    let structured = messages.iter().any(|m| {
        m.lines().any(|line| {
            let trimmed = line.trim_start();
            trimmed.starts_with('-') || trimmed.starts_with('*') || trimmed.starts_with("1.") || trimmed.starts_with("2.")
        })
    });
    let format_pref = if structured { "structured" } else { "freeform" };

    json!({
        "thread_id": thread_id,
        "updated_at": generated_at,
        "message_window": messages.len(),
        "verbosity": verbosity,
        "emoji": emoji_preference,
        "format": format_pref,
    })
}

/// Opens (or otherwise provides) the [`MemoryStore`] backing one thread,
/// given its id. Kept as an injected capability rather than a concrete
/// path-construction rule, since the per-thread-database naming scheme is
/// the caller's (the `crt` binary's) concern, not this module's.
pub trait ThreadStoreOpener: Send + Sync {
    /// Opens the store for `thread_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    fn open(&self, thread_id: &str) -> Result<Box<dyn MemoryStore>>;
}

impl<F> ThreadStoreOpener for F
where
    F: Fn(&str) -> Result<Box<dyn MemoryStore>> + Send + Sync,
{
    fn open(&self, thread_id: &str) -> Result<Box<dyn MemoryStore>> {
        self(thread_id)
    }
}

fn recent_messages(opener: &dyn ThreadStoreOpener, thread_id: &str, window: usize) -> Result<Vec<String>> {
    let store = opener.open(thread_id)?;
    store.recent_user_texts(window)
}

/// Periodic reflection-scorecard writer, grounded verbatim on
/// `ReflectionLoop`.
pub struct ReflectionLoop {
    global: Arc<GlobalStore>,
    opener: Arc<dyn ThreadStoreOpener>,
    interval: Duration,
    window: usize,
    enabled: bool,
}

impl ReflectionLoop {
    /// Builds a reflection loop. `interval_secs` is floored at 60 and
    /// `window` at 5, matching the original's `max(60, ...)`/`max(5,
    /// ...)` constructor clamps.
    #[must_use]
    pub fn new(
        global: Arc<GlobalStore>,
        opener: Arc<dyn ThreadStoreOpener>,
        interval_secs: u64,
        window: usize,
        enabled: bool,
    ) -> Self {
        Self {
            global,
            opener,
            interval: Duration::from_secs(interval_secs.max(60)),
            window: window.max(5),
            enabled,
        }
    }

    /// Runs one pass over every registered thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread registry cannot be read.
    pub fn run_once(&self) -> Result<()> {
        for thread_id in self.global.list_threads(200)? {
            if let Err(err) = self.run_for_thread(&thread_id, None) {
                tracing::warn!(thread_id = %thread_id, error = %err, "reflection loop pass failed");
            }
        }
        Ok(())
    }

    /// Builds and stores a scorecard for one thread, grounded on
    /// `run_for_thread`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread's store cannot be opened or the
    /// scorecard cannot be persisted.
    pub fn run_for_thread(&self, thread_id: &str, prompt: Option<&str>) -> Result<serde_json::Value> {
        let messages = recent_messages(self.opener.as_ref(), thread_id, self.window)?;
        let now = crate::current_timestamp();
        let mut scorecard = build_reflection_scorecard(thread_id, &messages, now);
        if let (Some(prompt), Some(obj)) = (prompt, scorecard.as_object_mut()) {
            obj.insert("manual_prompt".to_string(), json!(prompt));
            obj.insert("manual_triggered_at".to_string(), json!(now));
        }
        self.global.store_reflection_scorecard(thread_id, &scorecard)?;
        Ok(scorecard)
    }

    /// Runs [`ReflectionLoop::run_once`] on `interval` until `shutdown`
    /// fires, matching the original's `_run_forever`: errors from one
    /// pass are logged and the loop continues rather than aborting.
    pub async fn run_forever(&self, mut shutdown: watch::Receiver<()>) {
        if !self.enabled {
            return;
        }
        tracing::info!("reflection loop started");
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once() {
                        tracing::warn!(error = %err, "reflection loop error");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("reflection loop stop requested");
                    break;
                }
            }
        }
    }
}

/// Periodic personality-profile writer, grounded verbatim on
/// `PersonalityLoop`.
pub struct PersonalityLoop {
    global: Arc<GlobalStore>,
    opener: Arc<dyn ThreadStoreOpener>,
    interval: Duration,
    window: usize,
    enabled: bool,
}

impl PersonalityLoop {
    /// Builds a personality loop with the same clamps as
    /// [`ReflectionLoop::new`].
    #[must_use]
    pub fn new(
        global: Arc<GlobalStore>,
        opener: Arc<dyn ThreadStoreOpener>,
        interval_secs: u64,
        window: usize,
        enabled: bool,
    ) -> Self {
        Self {
            global,
            opener,
            interval: Duration::from_secs(interval_secs.max(60)),
            window: window.max(5),
            enabled,
        }
    }

    /// Runs one pass over every registered thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread registry cannot be read.
    pub fn run_once(&self) -> Result<()> {
        for thread_id in self.global.list_threads(200)? {
            if let Err(err) = self.run_for_thread(&thread_id, None) {
                tracing::warn!(thread_id = %thread_id, error = %err, "personality loop pass failed");
            }
        }
        Ok(())
    }

    /// Builds and stores a personality profile for one thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread's store cannot be opened or the
    /// profile cannot be persisted.
    pub fn run_for_thread(&self, thread_id: &str, prompt: Option<&str>) -> Result<serde_json::Value> {
        let messages = recent_messages(self.opener.as_ref(), thread_id, self.window)?;
        let now = crate::current_timestamp();
        let mut profile = build_personality_profile(thread_id, &messages, now);
        if let (Some(prompt), Some(obj)) = (prompt, profile.as_object_mut()) {
            obj.insert("manual_prompt".to_string(), json!(prompt));
            obj.insert("manual_triggered_at".to_string(), json!(now));
        }
        self.global.store_personality_profile(thread_id, &profile)?;
        Ok(profile)
    }

    /// Runs [`PersonalityLoop::run_once`] on `interval` until `shutdown`
    /// fires.
    pub async fn run_forever(&self, mut shutdown: watch::Receiver<()>) {
        if !self.enabled {
            return;
        }
        tracing::info!("personality loop started");
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once() {
                        tracing::warn!(error = %err, "personality loop error");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("personality loop stop requested");
                    break;
                }
            }
        }
    }
}

/// Builds both loops from [`crate::config::LoopsConfig`], grounded on
/// `build_loops`'s env-var-driven construction (the env vars themselves
/// are read once by the caller into `LoopsConfig` via
/// [`crate::config::CrtConfig::from_toml_str`]'s `${VAR}` expansion,
/// rather than re-read here).
#[must_use]
pub fn build_loops(
    config: &crate::config::LoopsConfig,
    global: Arc<GlobalStore>,
    opener: Arc<dyn ThreadStoreOpener>,
) -> (ReflectionLoop, PersonalityLoop) {
    (
        ReflectionLoop::new(
            Arc::clone(&global),
            Arc::clone(&opener),
            config.reflection_interval_secs,
            config.message_window,
            config.reflection_enabled,
        ),
        PersonalityLoop::new(global, opener, config.personality_interval_secs, config.message_window, config.personality_enabled),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn msgs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_tokenize_drops_stopwords_and_short_tokens() {
        let tokens = tokenize("I am a the cat and dog lovers");
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"am".to_string()));
        assert!(tokens.contains(&"lovers".to_string()));
    }

    #[test]
    fn test_top_topics_orders_by_count_descending() {
        let counts = topic_counts(&msgs(&["pottery pottery clay", "pottery glaze"]));
        let top = top_topics(&counts, 2);
        assert_eq!(top[0]["topic"], "pottery");
    }

    #[test]
    fn test_trend_topics_detects_rising() {
        let messages = msgs(&[
            "nothing special here",
            "nothing special here",
            "pottery pottery pottery",
            "pottery pottery pottery",
        ]);
        let trends = trend_topics(&messages);
        let rising = trends["rising"].as_array().unwrap();
        assert!(rising.iter().any(|t| t["topic"] == "pottery"));
    }

    #[test]
    fn test_trend_topics_empty_messages() {
        let trends = trend_topics(&[]);
        assert_eq!(trends["rising"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_emoji_present_detects_emoji() {
        assert!(emoji_present("nice work \u{1F600}"));
        assert!(!emoji_present("nice work"));
    }

    #[test]
    fn test_build_reflection_scorecard_shape() {
        let scorecard = build_reflection_scorecard("t1", &msgs(&["pottery is fun", "pottery class tonight"]), 1000);
        assert_eq!(scorecard["thread_id"], "t1");
        assert_eq!(scorecard["message_window"], 2);
    }

    #[test]
    fn test_build_personality_profile_concise_for_short_messages() {
        let profile = build_personality_profile("t1", &msgs(&["hi", "ok", "sure"]), 1000);
        assert_eq!(profile["verbosity"], "concise");
    }

    #[test]
    fn test_build_personality_profile_structured_detects_bullets() {
        let profile = build_personality_profile("t1", &msgs(&["- item one\n- item two"]), 1000);
        assert_eq!(profile["format"], "structured");
    }

    struct EmptyOpener;
    impl ThreadStoreOpener for EmptyOpener {
        fn open(&self, _thread_id: &str) -> Result<Box<dyn MemoryStore>> {
            Ok(Box::new(crate::memory::SqliteMemoryStore::open_in_memory()?))
        }
    }

    #[test]
    fn test_reflection_loop_run_once_over_no_threads() {
        let global = Arc::new(GlobalStore::open_in_memory().unwrap());
        let opener: Arc<dyn ThreadStoreOpener> = Arc::new(EmptyOpener);
        let loop_ = ReflectionLoop::new(global, opener, 60, 5, true);
        assert!(loop_.run_once().is_ok());
    }

    #[test]
    fn test_reflection_loop_run_for_thread_stores_scorecard() {
        let global = Arc::new(GlobalStore::open_in_memory().unwrap());
        let opener: Arc<dyn ThreadStoreOpener> = Arc::new(EmptyOpener);
        let loop_ = ReflectionLoop::new(Arc::clone(&global), opener, 60, 5, true);
        loop_.run_for_thread("thread-x", None).unwrap();
        assert!(global.latest_payload("reflection_scorecards", "thread-x").unwrap().is_some());
    }

    #[test]
    fn test_personality_loop_run_for_thread_stores_profile() {
        let global = Arc::new(GlobalStore::open_in_memory().unwrap());
        let opener: Arc<dyn ThreadStoreOpener> = Arc::new(EmptyOpener);
        let loop_ = PersonalityLoop::new(Arc::clone(&global), opener, 60, 5, true);
        loop_.run_for_thread("thread-x", None).unwrap();
        assert!(global.latest_payload("personality_profiles", "thread-x").unwrap().is_some());
    }

    #[test]
    fn test_interval_and_window_are_clamped() {
        let global = Arc::new(GlobalStore::open_in_memory().unwrap());
        let opener: Arc<dyn ThreadStoreOpener> = Arc::new(EmptyOpener);
        let loop_ = ReflectionLoop::new(global, opener, 1, 1, true);
        assert_eq!(loop_.interval, Duration::from_secs(60));
        assert_eq!(loop_.window, 5);
    }
}
