//! Message router: quota gate, classifier, KB, then AI escalation.
//!
//! Every routed turn (anything past validation) persists exactly one user row.
//! Every turn except a failed completion call also persists exactly one
//! assistant row.

use crate::canned::canned_reply;
use crate::classifier::IntentClassifier;
use crate::error::RouterError;
use crate::prompt::{PromptContext, build_messages, build_system_prompt};
use crate::quota::{QuotaDecision, QuotaLedger};
use log::{debug, info, warn};
use moneydesk_rs_config::{MoneyDeskConfig, QuotaConfig, RouterConfig};
use moneydesk_rs_kb::{
    KbArticle, KbMatchType, KbSearchResult, KbSearcher, KnowledgeBase, SearchThresholds,
    ShortcutSpec, builtin_shortcuts,
};
use moneydesk_rs_protocol::{
    ArticleSuggestion, ChatReply, ChatRequest, ClassificationResult, Clock, CompletionRequest,
    CompletionService, ConversationStore, FinanceContextProvider, Intent, MessageSource,
    NewMessage, ReplySource, SystemClock, UsageEvent, UsageRecorder, UsageStore, UsageSummary,
    UserContext,
};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Instant;

/// Prefix marking replies served from the knowledge base.
pub const KB_REPLY_MARKER: &str = "📚";

/// Routes one inbound message to a canned, KB or AI reply.
pub struct MessageRouter {
    settings: RouterConfig,
    chat_feature: String,
    token_feature: String,
    classifier: IntentClassifier,
    searcher: KbSearcher,
    quota: QuotaLedger,
    kb: Arc<dyn KnowledgeBase>,
    conversations: Arc<dyn ConversationStore>,
    completion: Arc<dyn CompletionService>,
    usage_log: Arc<dyn UsageRecorder>,
    finance_context: Option<Arc<dyn FinanceContextProvider>>,
    rng: Mutex<StdRng>,
}

/// Chat and token decisions taken at the gate.
struct Gate {
    chat: QuotaDecision,
    tokens: QuotaDecision,
}

impl Gate {
    fn allowed(&self) -> bool {
        self.chat.allowed && self.tokens.allowed
    }

    fn denial_message(&self) -> String {
        [&self.chat, &self.tokens]
            .into_iter()
            .find(|decision| !decision.allowed)
            .and_then(|decision| decision.message.clone())
            .unwrap_or_else(|| {
                "You've reached your usage limit. Upgrade your plan for more.".to_string()
            })
    }

    /// Usage figures after a turn that spent `tokens_used` tokens and
    /// `messages_used` chat uses.
    fn summary(&self, tokens_used: i64, messages_used: i64) -> UsageSummary {
        let (remaining, usage_percent) = if self.tokens.is_unbounded() {
            (-1, 0.0)
        } else {
            let spent = self.tokens.used + tokens_used;
            let limit = self.tokens.limit;
            let percent = if limit > 0 {
                (spent as f64 / limit as f64 * 100.0).min(100.0)
            } else {
                100.0
            };
            ((limit - spent).max(0), percent)
        };
        let daily_remaining = if self.chat.is_unbounded() {
            -1
        } else {
            (self.chat.limit - self.chat.used - messages_used).max(0)
        };
        UsageSummary {
            tokens_used,
            remaining,
            usage_percent,
            daily_remaining,
        }
    }
}

impl MessageRouter {
    pub fn builder() -> MessageRouterBuilder {
        MessageRouterBuilder::default()
    }

    /// Route one message for an authenticated user.
    pub async fn route(
        &self,
        user: &UserContext,
        request: ChatRequest,
    ) -> Result<ChatReply, RouterError> {
        let message = self.validate(&request.message)?;
        let conversation_id = self
            .resolve_conversation(&user.id, request.conversation_id.as_deref())
            .await?;
        debug!(
            "routing message (user_id={}, tier={}, conversation_id={}, len={})",
            user.id,
            user.tier,
            conversation_id,
            message.chars().count()
        );

        let gate = Gate {
            chat: self.quota.check(&user.id, user.tier, &self.chat_feature).await,
            tokens: self.quota.check(&user.id, user.tier, &self.token_feature).await,
        };
        if !gate.allowed() {
            info!(
                "quota gate denied (user_id={}, tier={}, conversation_id={})",
                user.id, user.tier, conversation_id
            );
            let reply = gate.denial_message();
            self.append(NewMessage::user(&conversation_id, &message))
                .await?;
            self.append(NewMessage::assistant(
                &conversation_id,
                &reply,
                MessageSource::Canned,
            ))
            .await?;
            return Ok(self
                .finish_free_turn(
                    user,
                    conversation_id,
                    reply,
                    ReplySource::Canned,
                    &gate,
                    Vec::new(),
                )
                .await);
        }

        let classification = self.classifier.classify(&message);
        debug!(
            "classified (conversation_id={}, intent={}, confidence={:.2})",
            conversation_id, classification.intent, classification.confidence
        );
        if classification.intent.is_cannable()
            && classification.confidence >= self.settings.canned_min_confidence
        {
            let reply = {
                let mut rng = self.rng.lock();
                canned_reply(classification.intent, &mut *rng).to_string()
            };
            self.append(
                NewMessage::user(&conversation_id, &message).with_classification(classification),
            )
            .await?;
            self.append(NewMessage::assistant(
                &conversation_id,
                &reply,
                MessageSource::Canned,
            ))
            .await?;
            return Ok(self
                .finish_free_turn(
                    user,
                    conversation_id,
                    reply,
                    ReplySource::Canned,
                    &gate,
                    Vec::new(),
                )
                .await);
        }

        let kb_result = self.search_kb(&message).await;
        if kb_result.match_type.is_answer() {
            if let Some(article) = kb_result.article.clone() {
                return self
                    .answer_from_kb(user, conversation_id, &message, article, &kb_result, &gate)
                    .await;
            }
        }

        let suggestions = if kb_result.match_type == KbMatchType::Partial {
            kb_result.suggestions
        } else {
            Vec::new()
        };
        self.escalate(user, conversation_id, &message, classification, suggestions, &gate)
            .await
    }

    fn validate(&self, message: &str) -> Result<String, RouterError> {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return Err(RouterError::Validation("message must not be empty".to_string()));
        }
        let max = self.settings.max_message_chars;
        if trimmed.chars().count() > max {
            return Err(RouterError::Validation(format!(
                "message must be at most {max} characters"
            )));
        }
        Ok(trimmed.to_string())
    }

    /// Reuse the requested conversation when it belongs to the user.
    async fn resolve_conversation(
        &self,
        user_id: &str,
        requested: Option<&str>,
    ) -> Result<String, RouterError> {
        if let Some(id) = requested.map(str::trim).filter(|id| !id.is_empty()) {
            match self.conversations.conversation_owner(id).await? {
                Some(owner) if owner == user_id => return Ok(id.to_string()),
                Some(_) => warn!(
                    "conversation belongs to another user; starting a new one (user_id={user_id}, conversation_id={id})"
                ),
                None => debug!("unknown conversation; starting a new one (conversation_id={id})"),
            }
        }
        Ok(self.conversations.create_conversation(user_id).await?)
    }

    async fn search_kb(&self, message: &str) -> KbSearchResult {
        match self.kb.articles().await {
            Ok(corpus) => self.searcher.search(message, &corpus),
            Err(err) => {
                warn!("kb corpus unavailable; treating as no match (error={err})");
                KbSearchResult::no_match()
            }
        }
    }

    async fn answer_from_kb(
        &self,
        user: &UserContext,
        conversation_id: String,
        message: &str,
        article: KbArticle,
        result: &KbSearchResult,
        gate: &Gate,
    ) -> Result<ChatReply, RouterError> {
        let reply = format!("{KB_REPLY_MARKER} {}", article.answer.trim());
        let classification = ClassificationResult::new(Intent::FaqMatch, result.confidence);
        self.append(
            NewMessage::user(&conversation_id, message).with_classification(classification),
        )
        .await?;
        self.append(
            NewMessage::assistant(&conversation_id, &reply, MessageSource::KbMatch)
                .with_kb_article(&article.id),
        )
        .await?;
        info!(
            "answered from kb (conversation_id={}, slug={}, match={}, confidence={:.2})",
            conversation_id,
            article.slug,
            result.match_type.as_str(),
            result.confidence
        );

        let kb = self.kb.clone();
        let article_id = article.id.clone();
        tokio::spawn(async move {
            if let Err(err) = kb.record_view(&article_id).await {
                warn!("kb view bump failed (article_id={article_id}, error={err})");
            }
        });

        Ok(self
            .finish_free_turn(
                user,
                conversation_id,
                reply,
                ReplySource::KbMatch,
                gate,
                to_suggestions(&result.suggestions),
            )
            .await)
    }

    async fn escalate(
        &self,
        user: &UserContext,
        conversation_id: String,
        message: &str,
        classification: ClassificationResult,
        suggestions: Vec<KbArticle>,
        gate: &Gate,
    ) -> Result<ChatReply, RouterError> {
        let history = if self.settings.history_window > 0 {
            self.conversations
                .recent_messages(&conversation_id, self.settings.history_window)
                .await?
        } else {
            Vec::new()
        };
        let finance_context = if classification.intent == Intent::FinancePersonal {
            self.load_finance_context(&user.id).await
        } else {
            None
        };
        let system_prompt = build_system_prompt(&PromptContext {
            intent: Some(classification.intent),
            finance_context: finance_context.as_deref(),
            suggestions: &suggestions,
            additional_instructions: self.settings.additional_instructions.as_deref(),
        });
        let messages = build_messages(
            system_prompt,
            &history,
            self.settings.history_max_chars,
            message,
        );

        self.append(
            NewMessage::user(&conversation_id, message).with_classification(classification),
        )
        .await?;

        let started = Instant::now();
        let response = match self
            .completion
            .complete(CompletionRequest {
                messages,
                ..CompletionRequest::default()
            })
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    "completion failed (user_id={}, conversation_id={}, error={})",
                    user.id, conversation_id, err
                );
                return Err(err.into());
            }
        };
        let latency_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let total_tokens = response.usage.total();

        self.append(
            NewMessage::assistant(&conversation_id, &response.content, MessageSource::AiGenerated)
                .with_completion(&response.model, response.usage, latency_ms),
        )
        .await?;
        info!(
            "answered with ai (conversation_id={}, model={}, tokens={}, latency_ms={})",
            conversation_id, response.model, total_tokens, latency_ms
        );

        self.quota.increment(&user.id, &self.chat_feature).await;
        self.quota
            .increment_by(&user.id, &self.token_feature, total_tokens)
            .await;
        if let Err(err) = self
            .conversations
            .add_conversation_tokens(&conversation_id, total_tokens)
            .await
        {
            warn!(
                "conversation totals update failed (conversation_id={conversation_id}, error={err})"
            );
        }
        self.record_usage(UsageEvent {
            user_id: user.id.clone(),
            conversation_id: conversation_id.clone(),
            source: ReplySource::Ai,
            input_tokens: response.usage.prompt_tokens,
            output_tokens: response.usage.completion_tokens,
            model: Some(response.model.clone()),
        })
        .await;

        Ok(ChatReply {
            message: response.content,
            source: ReplySource::Ai,
            conversation_id,
            usage: gate.summary(total_tokens, 1),
            suggestions: to_suggestions(&suggestions),
        })
    }

    async fn load_finance_context(&self, user_id: &str) -> Option<String> {
        let provider = self.finance_context.as_ref()?;
        match provider.snapshot(user_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("finance context unavailable (user_id={user_id}, error={err})");
                None
            }
        }
    }

    /// Log and meter a turn that did not call the completion service.
    async fn finish_free_turn(
        &self,
        user: &UserContext,
        conversation_id: String,
        reply: String,
        source: ReplySource,
        gate: &Gate,
        suggestions: Vec<ArticleSuggestion>,
    ) -> ChatReply {
        self.record_usage(UsageEvent::zero_cost(&user.id, &conversation_id, source))
            .await;
        ChatReply {
            message: reply,
            source,
            conversation_id,
            usage: gate.summary(0, 0),
            suggestions,
        }
    }

    async fn append(&self, message: NewMessage) -> Result<String, RouterError> {
        Ok(self.conversations.append_message(message).await?)
    }

    async fn record_usage(&self, event: UsageEvent) {
        let conversation_id = event.conversation_id.clone();
        if let Err(err) = self.usage_log.record(event).await {
            warn!("usage log write failed (conversation_id={conversation_id}, error={err})");
        }
    }
}

fn to_suggestions(articles: &[KbArticle]) -> Vec<ArticleSuggestion> {
    articles
        .iter()
        .map(|article| ArticleSuggestion {
            slug: article.slug.clone(),
            question: article.question.clone(),
        })
        .collect()
}

/// Builder for assembling a `MessageRouter` from config and collaborators.
#[derive(Default)]
pub struct MessageRouterBuilder {
    router: RouterConfig,
    quota: QuotaConfig,
    thresholds: SearchThresholds,
    shortcuts: Option<Vec<ShortcutSpec>>,
    kb: Option<Arc<dyn KnowledgeBase>>,
    conversations: Option<Arc<dyn ConversationStore>>,
    usage_store: Option<Arc<dyn UsageStore>>,
    usage_log: Option<Arc<dyn UsageRecorder>>,
    completion: Option<Arc<dyn CompletionService>>,
    finance_context: Option<Arc<dyn FinanceContextProvider>>,
    clock: Option<Arc<dyn Clock>>,
    seed: Option<u64>,
}

impl MessageRouterBuilder {
    /// Apply router, KB and quota settings from a loaded config.
    pub fn config(mut self, config: &MoneyDeskConfig) -> Self {
        self.router = config.router.clone();
        self.quota = config.quota.clone();
        self.thresholds = SearchThresholds {
            exact: config.kb.exact_threshold,
            good: config.kb.good_threshold,
            partial: config.kb.partial_threshold,
        };
        self.shortcuts = config.kb.shortcuts.as_ref().map(|rules| {
            rules
                .iter()
                .map(|rule| ShortcutSpec::new(&rule.pattern, &rule.slug))
                .collect()
        });
        self
    }

    pub fn knowledge_base(mut self, kb: Arc<dyn KnowledgeBase>) -> Self {
        self.kb = Some(kb);
        self
    }

    pub fn conversations(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.conversations = Some(store);
        self
    }

    pub fn usage_store(mut self, store: Arc<dyn UsageStore>) -> Self {
        self.usage_store = Some(store);
        self
    }

    pub fn usage_log(mut self, recorder: Arc<dyn UsageRecorder>) -> Self {
        self.usage_log = Some(recorder);
        self
    }

    pub fn completion(mut self, completion: Arc<dyn CompletionService>) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn finance_context(mut self, provider: Arc<dyn FinanceContextProvider>) -> Self {
        self.finance_context = Some(provider);
        self
    }

    /// Clock used for quota periods; defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Seed for canned reply selection; defaults to OS entropy.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<MessageRouter, RouterError> {
        let kb = self.kb.ok_or_else(|| missing("knowledge base"))?;
        let conversations = self.conversations.ok_or_else(|| missing("conversation store"))?;
        let usage_store = self.usage_store.ok_or_else(|| missing("usage store"))?;
        let usage_log = self.usage_log.ok_or_else(|| missing("usage log"))?;
        let completion = self.completion.ok_or_else(|| missing("completion service"))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let shortcuts = self.shortcuts.unwrap_or_else(builtin_shortcuts);
        let searcher = KbSearcher::new(&shortcuts, self.thresholds)
            .map_err(|err| RouterError::Setup(err.to_string()))?;
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(MessageRouter {
            chat_feature: self.quota.chat_feature.clone(),
            token_feature: self.quota.token_feature.clone(),
            settings: self.router,
            classifier: IntentClassifier::new()?,
            searcher,
            quota: QuotaLedger::new(self.quota, usage_store, clock),
            kb,
            conversations,
            completion,
            usage_log,
            finance_context: self.finance_context,
            rng: Mutex::new(rng),
        })
    }
}

fn missing(what: &str) -> RouterError {
    RouterError::Setup(format!("missing {what}"))
}
