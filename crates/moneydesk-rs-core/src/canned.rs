//! Canned replies for intents that never reach the KB or AI.

use moneydesk_rs_protocol::Intent;
use rand::Rng;

const GREETING: &[&str] = &[
    "Hi there! I'm the MoneyDesk assistant. Ask me anything about budgets, saving, or your account.",
    "Hello! How can I help with your finances today?",
    "Hey! I can help with budgeting, spending insights, and questions about MoneyDesk.",
];

const THANKS: &[&str] = &[
    "You're welcome! Anything else I can help with?",
    "Happy to help. Let me know if you have another question.",
    "Glad that helped!",
];

const OFF_TOPIC: &[&str] = &[
    "I can only help with personal finance and MoneyDesk questions. Is there something money-related I can look into?",
    "That's outside what I can help with. Try asking about budgets, saving, debt, or your MoneyDesk account.",
];

const ABUSE: &[&str] = &[
    "I can't help with that. I'm here to answer questions about your finances and MoneyDesk.",
];

const FALLBACK: &[&str] = &["How can I help with your finances today?"];

/// Pick a reply for a cannable intent using the supplied random source.
pub fn canned_reply<R: Rng + ?Sized>(intent: Intent, rng: &mut R) -> &'static str {
    let options = match intent {
        Intent::Greeting => GREETING,
        Intent::Thanks => THANKS,
        Intent::OffTopic => OFF_TOPIC,
        Intent::Abuse => ABUSE,
        _ => FALLBACK,
    };
    options[rng.random_range(0..options.len())]
}

#[cfg(test)]
mod tests {
    use super::{ABUSE, GREETING, canned_reply};
    use moneydesk_rs_protocol::Intent;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn same_seed_same_reply() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            assert_eq!(
                canned_reply(Intent::Greeting, &mut a),
                canned_reply(Intent::Greeting, &mut b)
            );
        }
    }

    #[test]
    fn replies_come_from_the_intent_pool() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(GREETING.contains(&canned_reply(Intent::Greeting, &mut rng)));
        assert_eq!(canned_reply(Intent::Abuse, &mut rng), ABUSE[0]);
    }
}
