use moneydesk_rs_config::MoneyDeskConfig;
use moneydesk_rs_core::{KB_REPLY_MARKER, MessageRouter, RouterError, period_key};
use moneydesk_rs_protocol::{
    ChatRequest, ChatRole, Clock, CompletionService, Intent, MessageRole, MessageSource, QuotaPeriod,
    ReplySource, Tier, UsageKey, UserContext,
};
use moneydesk_rs_test_utils::{
    FailingCompletion, FixedClock, FixedCompletion, MemoryConversationStore, MemoryUsageStore,
    RecordingCompletion, RecordingUsageRecorder, StubFinanceContext, StubKnowledgeBase,
    sample_articles,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const SNAPSHOT: &str = "Credit card balance: $4,200 at 24% APR";

struct Harness {
    router: MessageRouter,
    conversations: Arc<MemoryConversationStore>,
    usage: Arc<MemoryUsageStore>,
    usage_log: Arc<RecordingUsageRecorder>,
    kb: Arc<StubKnowledgeBase>,
    finance: Arc<StubFinanceContext>,
    clock: Arc<FixedClock>,
}

impl Harness {
    fn new() -> Self {
        Self::with(
            MoneyDeskConfig::default(),
            Arc::new(FixedCompletion::new("Pay the highest APR card first.")),
        )
    }

    fn with_completion(completion: Arc<dyn CompletionService>) -> Self {
        Self::with(MoneyDeskConfig::default(), completion)
    }

    fn with(config: MoneyDeskConfig, completion: Arc<dyn CompletionService>) -> Self {
        let conversations = Arc::new(MemoryConversationStore::new());
        let usage = Arc::new(MemoryUsageStore::new());
        let usage_log = Arc::new(RecordingUsageRecorder::new());
        let kb = Arc::new(StubKnowledgeBase::new(sample_articles()));
        let finance = Arc::new(StubFinanceContext::new(SNAPSHOT));
        let clock = Arc::new(FixedClock::on(2026, 3, 2));
        let router = MessageRouter::builder()
            .config(&config)
            .knowledge_base(kb.clone())
            .conversations(conversations.clone())
            .usage_store(usage.clone())
            .usage_log(usage_log.clone())
            .completion(completion)
            .finance_context(finance.clone())
            .clock(clock.clone())
            .seed(7)
            .build()
            .expect("router");
        Self {
            router,
            conversations,
            usage,
            usage_log,
            kb,
            finance,
            clock,
        }
    }

    fn key(&self, user: &str, feature: &str, period: QuotaPeriod) -> UsageKey {
        UsageKey::new(user, feature, period_key(period, self.clock.now()))
    }
}

fn request(message: &str) -> ChatRequest {
    ChatRequest {
        message: message.to_string(),
        conversation_id: None,
    }
}

fn free_user() -> UserContext {
    UserContext::new("u1", Tier::Free)
}

#[tokio::test]
async fn greeting_gets_canned_reply_without_tokens() {
    let harness = Harness::new();
    let reply = harness
        .router
        .route(&free_user(), request("Hello!"))
        .await
        .expect("reply");

    assert_eq!(reply.source, ReplySource::Canned);
    assert!(!reply.message.is_empty());
    assert_eq!(reply.usage.tokens_used, 0);
    assert_eq!(reply.usage.remaining, 50_000);
    assert_eq!(reply.usage.daily_remaining, 20);

    let rows = harness.conversations.messages(&reply.conversation_id);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].role, MessageRole::User);
    assert_eq!(rows[0].intent, Some(Intent::Greeting));
    assert_eq!(rows[1].source, MessageSource::Canned);
    assert_eq!(harness.usage.rows(), Vec::new());
}

#[tokio::test]
async fn budget_question_is_answered_from_kb() {
    let harness = Harness::new();
    let reply = harness
        .router
        .route(&free_user(), request("How do I create a budget?"))
        .await
        .expect("reply");

    assert_eq!(reply.source, ReplySource::KbMatch);
    assert!(reply.message.starts_with(KB_REPLY_MARKER));
    assert!(reply.message.contains("Answer for how-to-create-budget."));
    assert_eq!(reply.usage.tokens_used, 0);

    let rows = harness.conversations.messages(&reply.conversation_id);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].intent, Some(Intent::FaqMatch));
    assert_eq!(rows[0].intent_confidence, Some(0.97));
    assert_eq!(rows[1].source, MessageSource::KbMatch);
    assert_eq!(rows[1].kb_article_id.as_deref(), Some("kb-budget"));

    // The view bump runs in the background.
    for _ in 0..50 {
        if !harness.kb.views().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(harness.kb.views(), vec!["kb-budget".to_string()]);
}

#[tokio::test]
async fn good_match_offers_runner_up_suggestions() {
    let mut config = MoneyDeskConfig::default();
    config.kb.shortcuts = Some(Vec::new());
    let harness = Harness::with(config, Arc::new(FixedCompletion::new("unused")));
    let reply = harness
        .router
        .route(&free_user(), request("How do I export my transactions?"))
        .await
        .expect("reply");

    assert_eq!(reply.source, ReplySource::KbMatch);
    let slugs: Vec<&str> = reply.suggestions.iter().map(|s| s.slug.as_str()).collect();
    assert_eq!(slugs, vec!["how-to-create-budget", "what-is-health-score"]);
    let rows = harness.conversations.messages(&reply.conversation_id);
    assert_eq!(rows[1].kb_article_id.as_deref(), Some("kb-export"));
}

#[tokio::test]
async fn personal_finance_question_escalates_with_snapshot() {
    let completion = Arc::new(RecordingCompletion::new(FixedCompletion::new(
        "Pay the highest APR card first.",
    )));
    let harness = Harness::with_completion(completion.clone());
    let reply = harness
        .router
        .route(
            &free_user(),
            request("I'm worried about my credit card debt"),
        )
        .await
        .expect("reply");

    assert_eq!(reply.source, ReplySource::Ai);
    assert_eq!(reply.message, "Pay the highest APR card first.");
    assert_eq!(reply.usage.tokens_used, 200);
    assert_eq!(reply.usage.remaining, 49_800);
    assert_eq!(reply.usage.daily_remaining, 19);
    assert!((reply.usage.usage_percent - 0.4).abs() < 1e-9);

    let requests = completion.requests();
    assert_eq!(requests.len(), 1);
    let messages = &requests[0].messages;
    assert_eq!(messages[0].role, ChatRole::System);
    assert!(messages[0].content.contains(SNAPSHOT));
    assert_eq!(
        messages.last().map(|m| m.content.as_str()),
        Some("I'm worried about my credit card debt")
    );
    assert_eq!(harness.finance.calls(), vec!["u1".to_string()]);

    let rows = harness.conversations.messages(&reply.conversation_id);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].intent, Some(Intent::FinancePersonal));
    assert_eq!(rows[0].intent_confidence, Some(0.88));
    assert_eq!(rows[1].source, MessageSource::AiGenerated);
    assert_eq!(rows[1].model_used.as_deref(), Some("test-model"));
    assert_eq!(rows[1].input_tokens, Some(120));
    assert_eq!(rows[1].output_tokens, Some(80));

    assert_eq!(
        harness
            .usage
            .count(&harness.key("u1", "chat", QuotaPeriod::Daily)),
        1
    );
    assert_eq!(
        harness
            .usage
            .count(&harness.key("u1", "chat_tokens", QuotaPeriod::Monthly)),
        200
    );
    let totals = harness
        .conversations
        .totals(&reply.conversation_id)
        .expect("totals");
    assert_eq!(totals.total_tokens, 200);
}

#[tokio::test]
async fn general_question_skips_finance_context() {
    let completion = Arc::new(RecordingCompletion::new(FixedCompletion::new("Compound interest grows.")));
    let harness = Harness::with_completion(completion.clone());
    harness
        .router
        .route(&free_user(), request("What is compound interest on a savings account?"))
        .await
        .expect("reply");
    assert!(harness.finance.calls().is_empty());
    let requests = completion.requests();
    assert!(!requests[0].messages[0].content.contains(SNAPSHOT));
}

#[tokio::test]
async fn partial_match_suggestions_reach_prompt_and_reply() {
    let completion = Arc::new(RecordingCompletion::new(FixedCompletion::new("It depends.")));
    let harness = Harness::with_completion(completion.clone());
    let reply = harness
        .router
        .route(&free_user(), request("what changes my score"))
        .await
        .expect("reply");

    assert_eq!(reply.source, ReplySource::Ai);
    let slugs: Vec<&str> = reply.suggestions.iter().map(|s| s.slug.as_str()).collect();
    assert_eq!(slugs, vec!["what-is-health-score", "export-data"]);
    let system = &completion.requests()[0].messages[0].content;
    assert!(system.contains("what-is-health-score"));
}

#[tokio::test]
async fn history_is_replayed_in_order() {
    let completion = Arc::new(RecordingCompletion::new(FixedCompletion::new("Sure.")));
    let harness = Harness::with_completion(completion.clone());
    let first = harness
        .router
        .route(&free_user(), request("Hello!"))
        .await
        .expect("first");
    harness
        .router
        .route(
            &free_user(),
            ChatRequest {
                message: "I'm worried about my credit card debt".to_string(),
                conversation_id: Some(first.conversation_id.clone()),
            },
        )
        .await
        .expect("second");

    let messages = &completion.requests()[0].messages;
    let roles: Vec<ChatRole> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            ChatRole::System,
            ChatRole::User,
            ChatRole::Assistant,
            ChatRole::User
        ]
    );
    assert_eq!(messages[1].content, "Hello!");
    assert_eq!(harness.conversations.messages(&first.conversation_id).len(), 4);
}

#[tokio::test]
async fn invalid_messages_have_no_side_effects() {
    let harness = Harness::new();
    let empty = harness
        .router
        .route(&free_user(), request("   "))
        .await
        .unwrap_err();
    assert!(empty.is_validation());

    let long = "a".repeat(501);
    let too_long = harness
        .router
        .route(&free_user(), request(&long))
        .await
        .unwrap_err();
    assert!(matches!(too_long, RouterError::Validation(_)));

    assert_eq!(harness.conversations.conversation_count(), 0);
    assert!(harness.conversations.all_messages().is_empty());
    assert_eq!(harness.usage.reads(), 0);
    assert!(harness.usage_log.events().is_empty());
}

#[tokio::test]
async fn message_at_the_limit_is_accepted() {
    let harness = Harness::new();
    let padded = format!("  {}  ", "budget ".repeat(71).trim_end());
    assert!(padded.trim().chars().count() <= 500);
    harness
        .router
        .route(&free_user(), request(&padded))
        .await
        .expect("reply");
}

#[tokio::test]
async fn exhausted_chat_quota_returns_canned_denial() {
    let harness = Harness::new();
    harness
        .usage
        .set_count(harness.key("u1", "chat", QuotaPeriod::Daily), 20);
    let denied = harness
        .router
        .route(&free_user(), request("I'm worried about my credit card debt"))
        .await
        .expect("reply");

    assert_eq!(denied.source, ReplySource::Canned);
    assert!(denied.message.contains("Upgrade"));
    assert!(denied.message.contains("today"));
    assert_eq!(denied.usage.daily_remaining, 0);

    let rows = harness.conversations.messages(&denied.conversation_id);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].source, MessageSource::Canned);
    assert_eq!(
        harness
            .usage
            .count(&harness.key("u1", "chat", QuotaPeriod::Daily)),
        20
    );
}

#[tokio::test]
async fn exhausted_token_budget_blocks_ai() {
    let harness = Harness::new();
    harness.usage.set_count(
        harness.key("u1", "chat_tokens", QuotaPeriod::Monthly),
        50_000,
    );
    let reply = harness
        .router
        .route(&free_user(), request("How do I create a budget?"))
        .await
        .expect("reply");
    assert_eq!(reply.source, ReplySource::Canned);
    assert!(reply.message.contains("chat tokens"));
    assert!(reply.message.contains("this month"));
    assert_eq!(reply.usage.remaining, 0);
    assert_eq!(reply.usage.usage_percent, 100.0);
}

#[tokio::test]
async fn quota_store_outage_fails_closed() {
    let harness = Harness::new();
    harness.usage.fail(true);
    let reply = harness
        .router
        .route(&free_user(), request("I'm worried about my credit card debt"))
        .await
        .expect("reply");
    assert_eq!(reply.source, ReplySource::Canned);
    assert!(reply.message.contains("couldn't verify"));
}

#[tokio::test]
async fn pro_tier_is_unbounded() {
    let harness = Harness::new();
    let reply = harness
        .router
        .route(
            &UserContext::new("u9", Tier::Pro),
            request("I'm worried about my credit card debt"),
        )
        .await
        .expect("reply");
    assert_eq!(reply.source, ReplySource::Ai);
    assert_eq!(reply.usage.remaining, -1);
    assert_eq!(reply.usage.daily_remaining, -1);
    assert_eq!(reply.usage.usage_percent, 0.0);
    assert_eq!(harness.usage.reads(), 0);
}

#[tokio::test]
async fn completion_failure_keeps_user_row_only() {
    let harness = Harness::with_completion(Arc::new(FailingCompletion::new("upstream 503")));
    let err = harness
        .router
        .route(&free_user(), request("I'm worried about my credit card debt"))
        .await
        .unwrap_err();

    assert!(matches!(err, RouterError::Completion(_)));
    assert_eq!(err.public_message(), "failed to process message");

    let rows = harness.conversations.all_messages();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].role, MessageRole::User);
    assert_eq!(harness.usage.rows(), Vec::new());
    assert!(harness.usage_log.events().is_empty());
}

#[tokio::test]
async fn append_failure_surfaces_store_error() {
    let harness = Harness::new();
    harness.conversations.fail_appends(true);
    let err = harness
        .router
        .route(&free_user(), request("Hello!"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Store(_)));
    assert!(harness.usage_log.events().is_empty());
}

#[tokio::test]
async fn foreign_conversation_id_starts_a_new_conversation() {
    let harness = Harness::new();
    let theirs = harness
        .router
        .route(&UserContext::new("u2", Tier::Basic), request("Hello!"))
        .await
        .expect("reply");

    let mine = harness
        .router
        .route(
            &free_user(),
            ChatRequest {
                message: "Thanks!".to_string(),
                conversation_id: Some(theirs.conversation_id.clone()),
            },
        )
        .await
        .expect("reply");
    assert_ne!(mine.conversation_id, theirs.conversation_id);
    assert_eq!(harness.conversations.messages(&theirs.conversation_id).len(), 2);

    let unknown = harness
        .router
        .route(
            &free_user(),
            ChatRequest {
                message: "Hello!".to_string(),
                conversation_id: Some("does-not-exist".to_string()),
            },
        )
        .await
        .expect("reply");
    assert_ne!(unknown.conversation_id, "does-not-exist");
}

#[tokio::test]
async fn every_turn_pairs_user_and_assistant_rows() {
    let harness = Harness::new();
    let mut conversation_id = None;
    for message in [
        "Hello!",
        "How do I create a budget?",
        "I'm worried about my credit card debt",
        "what changes my score",
        "Thanks!",
    ] {
        let reply = harness
            .router
            .route(
                &free_user(),
                ChatRequest {
                    message: message.to_string(),
                    conversation_id: conversation_id.clone(),
                },
            )
            .await
            .expect("reply");
        conversation_id = Some(reply.conversation_id);
    }
    let rows = harness
        .conversations
        .messages(conversation_id.as_deref().expect("conversation"));
    assert_eq!(rows.len(), 10);
    for pair in rows.chunks(2) {
        assert_eq!(pair[0].role, MessageRole::User);
        assert_eq!(pair[0].source, MessageSource::System);
        assert_eq!(pair[1].role, MessageRole::Assistant);
    }
}

#[tokio::test]
async fn usage_log_records_every_branch() {
    let harness = Harness::new();
    for message in [
        "Hello!",
        "How do I create a budget?",
        "I'm worried about my credit card debt",
    ] {
        harness
            .router
            .route(&free_user(), request(message))
            .await
            .expect("reply");
    }
    let events = harness.usage_log.events();
    let sources: Vec<ReplySource> = events.iter().map(|e| e.source).collect();
    assert_eq!(
        sources,
        vec![ReplySource::Canned, ReplySource::KbMatch, ReplySource::Ai]
    );
    assert_eq!(events[0].input_tokens + events[0].output_tokens, 0);
    assert_eq!(events[2].input_tokens, 120);
    assert_eq!(events[2].model.as_deref(), Some("test-model"));
}

#[tokio::test]
async fn kb_outage_falls_through_to_ai() {
    let harness = Harness::new();
    harness.kb.fail_articles(true);
    let reply = harness
        .router
        .route(&free_user(), request("How do I create a budget?"))
        .await
        .expect("reply");
    assert_eq!(reply.source, ReplySource::Ai);
}

#[tokio::test]
async fn builder_requires_collaborators() {
    let err = MessageRouter::builder().build().err().expect("error");
    assert!(matches!(err, RouterError::Setup(_)));
}
