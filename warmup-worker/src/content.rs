//! Randomized warmup content: subjects, bodies, replies and Message-IDs.
//!
//! Everything here is pure apart from drawing from the supplied RNG.

use std::time::Duration;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::prelude::*;

const SUBJECTS: &[&str] = &[
    "Quick question about {topic}",
    "Following up on our conversation",
    "Thoughts on {topic}?",
    "Re: {topic} discussion",
    "Can you help with {topic}?",
    "{topic} - your thoughts?",
    "Checking in",
    "Quick update on {topic}",
    "About {topic}",
    "{topic} clarification",
    "Update regarding {topic}",
    "Question about {topic}",
    "Your input needed on {topic}",
    "{topic} follow-up",
    "Regarding {topic}",
];

const BODIES: &[&str] = &[
    "Hey,\n\nJust wanted to follow up on {topic}. Let me know your thoughts when you get a chance.\n\nThanks!",
    "Hi there,\n\nI was thinking about {topic} and wanted to get your input. What do you think?\n\nBest,",
    "Hello,\n\nHope you're doing well! Quick question about {topic} - do you have any recommendations?\n\nCheers,",
    "Hi,\n\nI wanted to touch base regarding {topic}. Could you share your perspective?\n\nAppreciate it!",
    "Hey,\n\nQuick one - any thoughts on {topic}? Would love your feedback.\n\nThanks,",
    "Hi,\n\nHope all is well. I had a question about {topic} and thought you might have some insights.\n\nBest regards,",
    "Hello,\n\nJust checking in on {topic}. Let me know if you have any updates.\n\nThanks!",
    "Hi there,\n\nWanted to get your take on {topic}. What's your opinion?\n\nBest,",
    "Hey,\n\nI've been working on {topic} and could use your input. Any thoughts?\n\nCheers,",
    "Hi,\n\nCan you help me understand {topic} better? I'd appreciate your guidance.\n\nThanks,",
    "Hello,\n\nI wanted to ask about {topic}. Do you have a moment to discuss?\n\nBest,",
    "Hi,\n\nFollowing up on {topic}. Any progress or updates?\n\nThanks!",
    "Hey,\n\nJust wondering about {topic}. What are your current thoughts?\n\nBest regards,",
    "Hi there,\n\nI had a quick question regarding {topic}. Could you clarify?\n\nAppreciate your help!",
    "Hello,\n\nHope you're having a great day! Quick inquiry about {topic}.\n\nThanks,",
];

const REPLY_BODIES: &[&str] = &[
    "Thanks for reaching out!\n\n{response}\n\nLet me know if you have any other questions.",
    "Great question!\n\n{response}\n\nHappy to discuss further.",
    "Thanks for the update.\n\n{response}\n\nTalk soon!",
    "Appreciate you following up.\n\n{response}\n\nLet me know how it goes!",
    "Good to hear from you!\n\n{response}\n\nFeel free to reach out anytime.",
    "Thanks for asking.\n\n{response}\n\nHope that helps!",
    "Hey!\n\n{response}\n\nLet me know if you need anything else.",
    "Thanks for checking in.\n\n{response}\n\nKeep me posted!",
    "Good question!\n\n{response}\n\nLet me know what you think.",
    "Appreciate the message.\n\n{response}\n\nTalk to you soon!",
];

const RESPONSES: &[&str] = &[
    "I think we should move forward with that approach. It makes sense given our timeline.",
    "That sounds good to me. Let's schedule a time to discuss the details.",
    "I agree with your assessment. We can proceed as planned.",
    "Thanks for bringing that up. I'll look into it and get back to you.",
    "That's a great point. Let's align on next steps.",
    "I reviewed the information and it looks solid. We're good to go.",
    "Appreciate you flagging this. I'll handle it on my end.",
    "Sounds like a plan. Let me know if anything changes.",
    "I think that approach will work well. Let's move forward.",
    "Good idea. I'll coordinate with the team.",
    "That makes sense. I'll follow up with more details soon.",
    "Thanks for the heads up. I'll take care of that.",
    "I'm on board with that direction. Keep me updated.",
    "That works for me. Let's touch base next week.",
    "Agreed. I'll make sure everything is in order.",
];

const TOPICS: &[&str] = &[
    "the project timeline",
    "next week's meeting",
    "the quarterly report",
    "the new process",
    "team updates",
    "the upcoming event",
    "our discussion",
    "the action items",
    "the documentation",
    "the latest changes",
    "the proposal",
    "next steps",
    "the schedule",
    "the requirements",
    "the deliverables",
    "the presentation",
    "the feedback",
    "the budget",
    "the resources",
    "coordination",
];

/// Deliberate misspellings; only the first occurrence is replaced.
const TYPOS: &[(&str, &str)] = &[
    ("the", "teh"),
    ("quick", "quikc"),
    ("about", "abotu"),
    ("thanks", "thnks"),
];

/// Length of the random part of a generated Message-ID.
const MESSAGE_ID_TOKEN_LEN: usize = 13;

/// Subject and body for a new conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundContent {
    pub subject: String,
    pub body: String,
}

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

/// Generate the subject and body opening a new thread.
///
/// With `typo_probability` one misspelling from a fixed table is injected
/// into the subject.
pub fn generate_outbound<R: Rng + ?Sized>(rng: &mut R, typo_probability: f64) -> OutboundContent {
    let topic = pick(rng, TOPICS);
    let subject = pick(rng, SUBJECTS).replace("{topic}", topic);
    let body = pick(rng, BODIES).replace("{topic}", topic);

    let subject = if rng.gen::<f64>() < typo_probability {
        add_typo(rng, &subject)
    } else {
        subject
    };

    OutboundContent { subject, body }
}

fn add_typo<R: Rng + ?Sized>(rng: &mut R, text: &str) -> String {
    match TYPOS.choose(rng) {
        Some((from, to)) => text.replacen(from, to, 1),
        None => text.to_string(),
    }
}

/// Generate the body of a reply within an existing thread.
pub fn generate_reply<R: Rng + ?Sized>(rng: &mut R) -> String {
    let response = pick(rng, RESPONSES);
    pick(rng, REPLY_BODIES).replace("{response}", response)
}

/// Generate a Message-ID header value: `<millis.token@domain>`.
pub fn generate_message_id<R: Rng + ?Sized>(rng: &mut R, domain: &str) -> String {
    let token: String = rng
        .sample_iter(&Alphanumeric)
        .take(MESSAGE_ID_TOKEN_LEN)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("<{}.{}@{}>", Utc::now().timestamp_millis(), token, domain)
}

/// Random delay between one and four hours before a reply would be sent.
pub fn generate_reply_delay<R: Rng + ?Sized>(rng: &mut R) -> Duration {
    let secs = rng.gen_range(3600.0..4.0 * 3600.0);
    Duration::from_millis((secs * 1000.0) as u64)
}
