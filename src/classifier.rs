//! # Thought Classifier Module
//!
//! Trigger-phrase matching that assigns every captured thought a category and
//! a set of topic tags. Pure function over the input text, no side effects;
//! the rest of the system treats it as an opaque collaborator.

/// Result of classifying one thought
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: String,
    pub topics: Vec<String>,
}

struct CategoryRule {
    name: &'static str,
    emoji: &'static str,
    triggers: &'static [&'static str],
}

struct TopicRule {
    name: &'static str,
    emoji: &'static str,
    keywords: &'static [&'static str],
}

const FALLBACK_CATEGORY: &str = "reflections";

const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        name: "tasks",
        emoji: "✅",
        triggers: &[
            "need to", "must", "don't forget", "remind", "tomorrow", "this week", "to do",
            "pay", "buy", "call", "write", "send", "schedule", "fix", "book",
        ],
    },
    CategoryRule {
        name: "ideas",
        emoji: "💡",
        triggers: &[
            "maybe", "what if", "idea", "interesting", "could be", "would be cool",
            "we could", "worth trying",
        ],
    },
    CategoryRule {
        name: "feelings",
        emoji: "💭",
        triggers: &[
            "i feel", "feeling", "frustrat", "happy", "sad", "angry", "scared", "stress",
            "anxious", "anxiety", "worried", "exhausted", "overwhelmed",
        ],
    },
    CategoryRule {
        name: "goals",
        emoji: "🎯",
        triggers: &[
            "start", "change", "improve", "learn", "develop", "goal", "want to", "dream",
            "achieve", "course", "gym",
        ],
    },
    CategoryRule {
        name: "reflections",
        emoji: "🤔",
        triggers: &[
            "why", "how come", "wonder", "question", "strange", "always", "never",
        ],
    },
];

const TOPIC_RULES: &[TopicRule] = &[
    TopicRule {
        name: "work",
        emoji: "💼",
        keywords: &["work", "office", "boss", "meeting", "email", "project", "client", "report"],
    },
    TopicRule {
        name: "home",
        emoji: "🏠",
        keywords: &["home", "cleaning", "repair", "rent", "electricity", "kitchen", "furniture"],
    },
    TopicRule {
        name: "money",
        emoji: "💰",
        keywords: &["money", "salary", "payment", "bank", "debt", "loan", "savings", "taxes"],
    },
    TopicRule {
        name: "health",
        emoji: "🏥",
        keywords: &["doctor", "appointment", "health", "pain", "medicine", "sport", "gym", "diet"],
    },
    TopicRule {
        name: "family",
        emoji: "👨‍👩‍👧‍👦",
        keywords: &["family", "parents", "kids", "partner", "brother", "sister", "birthday"],
    },
    TopicRule {
        name: "friends",
        emoji: "👥",
        keywords: &["friend", "party", "hangout", "coffee", "beer", "catch up"],
    },
    TopicRule {
        name: "learning",
        emoji: "📚",
        keywords: &["course", "study", "book", "article", "workshop", "degree", "lesson"],
    },
    TopicRule {
        name: "shopping",
        emoji: "🛒",
        keywords: &["buy", "purchase", "store", "groceries", "gift", "order", "delivery"],
    },
];

/// Classify raw thought text into a category plus topic tags.
///
/// The category with the most trigger hits wins; ties break towards the
/// earlier rule; no hits fall back to "reflections".
pub fn classify(text: &str) -> Classification {
    let lowered = text.to_lowercase();

    let mut best: Option<(&CategoryRule, usize)> = None;
    for rule in CATEGORY_RULES {
        let hits = rule
            .triggers
            .iter()
            .filter(|t| lowered.contains(*t))
            .count();
        if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
            best = Some((rule, hits));
        }
    }
    let category = best
        .map(|(rule, _)| rule.name)
        .unwrap_or(FALLBACK_CATEGORY)
        .to_string();

    let topics = TOPIC_RULES
        .iter()
        .filter(|rule| rule.keywords.iter().any(|k| lowered.contains(k)))
        .map(|rule| rule.name.to_string())
        .collect();

    Classification { category, topics }
}

/// Display emoji for a category, with a neutral fallback for unknown names.
pub fn category_emoji(category: &str) -> &'static str {
    CATEGORY_RULES
        .iter()
        .find(|rule| rule.name == category)
        .map(|rule| rule.emoji)
        .unwrap_or("📝")
}

/// Display emoji for a topic tag.
pub fn topic_emoji(topic: &str) -> &'static str {
    TOPIC_RULES
        .iter()
        .find(|rule| rule.name == topic)
        .map(|rule| rule.emoji)
        .unwrap_or("🏷️")
}
