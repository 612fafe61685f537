// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-turn state machine: classify, retrieve, synthesize, persist.
//!
//! Every turn runs under a per-chat lock, so a second message from the
//! same user waits for the first reply to be stored. A supervisor wrapper
//! guarantees the user always gets a reply and the store always sees the
//! user's turn, whatever fails downstream. The soft turn deadline produces
//! a polite fallback, never a user-visible error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use kiosk_catalog::CatalogEngine;
use kiosk_core::{Intent, KioskError, Message, Role, ScoredProduct};
use kiosk_leads::{LeadDraft, LeadPipeline};
use kiosk_llm::prompts::render;
use kiosk_llm::{ChatMessage, LlmGateway, PromptRegistry};
use kiosk_logging::HybridLogger;
use kiosk_storage::{queries, Database};
use tokio::sync::Mutex;
use tracing::debug;

use crate::classifier::QueryClassifier;
use crate::conversation::ConversationStore;
use crate::knowledge::KnowledgeStore;
use crate::monitor::InactivityMonitor;

/// Soft deadline for one whole turn.
const TURN_DEADLINE: Duration = Duration::from_secs(10);

/// Results requested from the catalog per product query.
const PRODUCT_RESULTS: usize = 10;

/// Catalog retrieval behind a seam so the orchestrator stays free of
/// vector-store specifics.
#[async_trait]
pub trait ProductSearch: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredProduct>, KioskError>;
}

#[async_trait]
impl ProductSearch for CatalogEngine {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredProduct>, KioskError> {
        CatalogEngine::search(self, query, k).await
    }
}

/// The assistant reply for one turn, plus the post-reply actions the
/// transport may render as buttons.
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub text: String,
    pub intent: Intent,
    pub suggested_actions: Vec<String>,
}

/// Display name parts arriving with a transport message.
#[derive(Debug, Clone, Default)]
pub struct SenderProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

pub struct Orchestrator {
    db: Database,
    conversations: Arc<ConversationStore>,
    classifier: QueryClassifier,
    catalog: Arc<dyn ProductSearch>,
    knowledge: KnowledgeStore,
    gateway: Arc<LlmGateway>,
    prompts: Arc<PromptRegistry>,
    leads: Arc<LeadPipeline>,
    logger: Arc<HybridLogger>,
    monitor: Option<Arc<InactivityMonitor>>,
    turn_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        conversations: Arc<ConversationStore>,
        classifier: QueryClassifier,
        catalog: Arc<dyn ProductSearch>,
        knowledge: KnowledgeStore,
        gateway: Arc<LlmGateway>,
        prompts: Arc<PromptRegistry>,
        leads: Arc<LeadPipeline>,
        logger: Arc<HybridLogger>,
        monitor: Option<Arc<InactivityMonitor>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            conversations,
            classifier,
            catalog,
            knowledge,
            gateway,
            prompts,
            leads,
            logger,
            monitor,
            turn_locks: DashMap::new(),
        })
    }

    /// Process one inbound user turn end to end.
    pub async fn handle_turn(
        &self,
        chat_id: &str,
        platform: &str,
        text: &str,
        profile: &SenderProfile,
    ) -> Result<TurnReply, KioskError> {
        // Turns from one chat are strictly serialized.
        let lock = self
            .turn_locks
            .entry(chat_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        queries::users::upsert_user(
            &self.db,
            chat_id,
            profile.first_name.as_deref(),
            profile.last_name.as_deref(),
            profile.username.as_deref(),
        )
        .await?;
        let conversation = self.conversations.open_or_get(chat_id, platform).await?;

        // The user's turn is stored before any fallible work.
        self.conversations
            .append(&conversation.id, Role::User, text, None)
            .await?;

        let turn = self.process(chat_id, &conversation.id, text);
        let reply = match tokio::time::timeout(TURN_DEADLINE, turn).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => self.supervise_failure(e).await,
            Err(_) => {
                self.logger
                    .warning(
                        "turn deadline exceeded, sending fallback reply",
                        Some(serde_json::json!({"chat_id": chat_id})),
                    )
                    .await;
                fallback_reply(Intent::General)
            }
        };

        let metadata = serde_json::json!({
            "intent": reply.intent.to_string(),
            "suggested_actions": reply.suggested_actions,
        });
        self.conversations
            .append(
                &conversation.id,
                Role::Assistant,
                &reply.text,
                Some(metadata.to_string()),
            )
            .await?;

        if let Some(monitor) = &self.monitor {
            monitor.note_activity(chat_id);
        }
        Ok(reply)
    }

    /// Map a failed turn onto a user-facing reply, logging by severity.
    async fn supervise_failure(&self, error: KioskError) -> TurnReply {
        match &error {
            KioskError::CostLimitExceeded(_) => {
                self.logger
                    .warning("llm call blocked by cost limit", None)
                    .await;
                TurnReply {
                    text: "Извините, ассистент временно недоступен. Пожалуйста, попробуйте позже \
                           или свяжитесь с менеджером. / Sorry, the assistant is temporarily \
                           unavailable, please try again later or contact a manager."
                        .to_string(),
                    intent: Intent::General,
                    suggested_actions: vec!["contact_manager".to_string()],
                }
            }
            KioskError::Internal(_) | KioskError::PermanentExternal { .. } => {
                self.logger
                    .critical(&format!("turn failed: {error}"), None)
                    .await;
                fallback_reply(Intent::General)
            }
            _ => {
                self.logger
                    .error(&format!("turn failed: {error}"), None)
                    .await;
                fallback_reply(Intent::General)
            }
        }
    }

    async fn process(
        &self,
        chat_id: &str,
        conversation_id: &str,
        text: &str,
    ) -> Result<TurnReply, KioskError> {
        let intent = self.classifier.classify(text).await;
        debug!(chat_id, intent = %intent, "turn classified");

        // Bounded history, excluding the just-appended user turn.
        let window = self.conversations.recent_window(conversation_id).await?;
        let history = to_chat_history(&window[..window.len().saturating_sub(1)]);

        match intent {
            Intent::Product => self.handle_product(text, history).await,
            Intent::Service => self.handle_service(text, history).await,
            Intent::CompanyInfo => self.handle_company_info(text, history).await,
            Intent::Contact => self.handle_contact(chat_id, text, history).await,
            Intent::General => self.handle_general(text, history).await,
        }
    }

    async fn handle_product(
        &self,
        text: &str,
        history: Vec<ChatMessage>,
    ) -> Result<TurnReply, KioskError> {
        let search_query = self.extract_search_query(text).await;
        let results = match self.catalog.search(&search_query, PRODUCT_RESULTS).await {
            Ok(results) => results,
            Err(KioskError::ModelUnavailable(reason)) => {
                self.logger
                    .warning(
                        &format!("catalog unavailable, answering without retrieval: {reason}"),
                        None,
                    )
                    .await;
                vec![]
            }
            Err(e) => return Err(e),
        };

        if results.is_empty() {
            let template = self.prompts.get("general_conversation").await?;
            let user_prompt = format!(
                "{}\n\nNo catalog items matched this request. Say so, offer to refine \
                 the search, and suggest contacting a manager.",
                render(&template, &[("user_query", text)])
            );
            let reply = self.generate(history, &user_prompt).await?;
            return Ok(TurnReply {
                text: reply,
                intent: Intent::Product,
                suggested_actions: vec![
                    "contact_manager".to_string(),
                    "refine_search".to_string(),
                ],
            });
        }

        let template = self.prompts.get("product_search").await?;
        let user_prompt = render(
            &template,
            &[
                ("search_results", &format_products(&results)),
                ("user_query", text),
            ],
        );
        let reply = self.generate(history, &user_prompt).await?;
        Ok(TurnReply {
            text: reply,
            intent: Intent::Product,
            suggested_actions: vec!["contact_manager".to_string(), "search_more".to_string()],
        })
    }

    async fn handle_service(
        &self,
        text: &str,
        history: Vec<ChatMessage>,
    ) -> Result<TurnReply, KioskError> {
        let services = self.knowledge.find_services(text).await?;
        if services.is_empty() {
            // No services on file: fall back to company info if present.
            if let Some(info) = self.knowledge.company_info().await? {
                let template = self.prompts.get("company_info").await?;
                let user_prompt =
                    render(&template, &[("company_info", info.as_str()), ("user_query", text)]);
                let reply = self.generate(history, &user_prompt).await?;
                return Ok(TurnReply {
                    text: reply,
                    intent: Intent::Service,
                    suggested_actions: vec!["contact_manager".to_string()],
                });
            }
            return Ok(TurnReply {
                text: "Подробная информация об услугах сейчас недоступна, свяжитесь, пожалуйста, \
                       с менеджером. / Detailed service information is unavailable right now, \
                       please contact a manager."
                    .to_string(),
                intent: Intent::Service,
                suggested_actions: vec!["contact_manager".to_string()],
            });
        }

        let template = self.prompts.get("service_answer").await?;
        let user_prompt = render(
            &template,
            &[
                ("services_info", &format_services(&services)),
                ("user_query", text),
            ],
        );
        let reply = self.generate(history, &user_prompt).await?;
        Ok(TurnReply {
            text: reply,
            intent: Intent::Service,
            suggested_actions: vec!["contact_manager".to_string(), "learn_more".to_string()],
        })
    }

    async fn handle_company_info(
        &self,
        text: &str,
        history: Vec<ChatMessage>,
    ) -> Result<TurnReply, KioskError> {
        let info = self.knowledge.company_info().await?.unwrap_or_else(|| {
            "The company supplies industrial equipment and spare parts, and provides \
             professional consultations and technical support."
                .to_string()
        });
        let template = self.prompts.get("company_info").await?;
        let user_prompt = render(
            &template,
            &[("company_info", info.as_str()), ("user_query", text)],
        );
        let reply = self.generate(history, &user_prompt).await?;
        Ok(TurnReply {
            text: reply,
            intent: Intent::CompanyInfo,
            suggested_actions: vec!["contact_manager".to_string(), "learn_services".to_string()],
        })
    }

    /// CONTACT short-circuits retrieval: capture or update the lead, then
    /// answer with the qualification prompt.
    async fn handle_contact(
        &self,
        chat_id: &str,
        text: &str,
        history: Vec<ChatMessage>,
    ) -> Result<TurnReply, KioskError> {
        let draft = extract_contact_details(text);
        let captured = self.leads.capture(chat_id, draft).await;

        let template = self.prompts.get("lead_qualification").await?;
        let user_prompt = match &captured {
            Ok(lead) => format!(
                "{}\n\nThe contact details are saved ({}). Confirm that a manager will be \
                 in touch shortly.",
                render(&template, &[("user_query", text)]),
                lead.phone.as_deref().or(lead.email.as_deref()).unwrap_or("-"),
            ),
            Err(KioskError::Validation(reason)) => format!(
                "{}\n\nThe details provided are not complete yet ({reason}). Ask for what \
                 is missing.",
                render(&template, &[("user_query", text)]),
            ),
            Err(e) => return Err(KioskError::Internal(format!("lead capture failed: {e}"))),
        };

        let reply = self.generate(history, &user_prompt).await?;
        Ok(TurnReply {
            text: reply,
            intent: Intent::Contact,
            suggested_actions: if captured.is_ok() {
                vec!["manager_will_call".to_string()]
            } else {
                vec!["provide_contacts".to_string()]
            },
        })
    }

    async fn handle_general(
        &self,
        text: &str,
        history: Vec<ChatMessage>,
    ) -> Result<TurnReply, KioskError> {
        let template = self.prompts.get("general_conversation").await?;
        let user_prompt = render(&template, &[("user_query", text)]);
        let reply = self.generate(history, &user_prompt).await?;
        Ok(TurnReply {
            text: reply,
            intent: Intent::General,
            suggested_actions: vec![
                "search_products".to_string(),
                "learn_services".to_string(),
                "contact_manager".to_string(),
            ],
        })
    }

    async fn generate(
        &self,
        history: Vec<ChatMessage>,
        user_prompt: &str,
    ) -> Result<String, KioskError> {
        let system = self.prompts.get("system_prompt").await?;
        let response = self.gateway.generate(&system, history, user_prompt).await?;
        Ok(response.content)
    }

    /// Distill the utterance into catalog search keywords via the LLM,
    /// falling back to a deterministic stop-phrase cleaner.
    async fn extract_search_query(&self, text: &str) -> String {
        let template = match self.prompts.get("search_query_extraction").await {
            Ok(template) => template,
            Err(_) => return clean_search_query(text),
        };
        let user_prompt = render(&template, &[("user_query", text)]);
        match self.gateway.generate("", vec![], &user_prompt).await {
            Ok(response) => {
                let extracted = response.content.trim().to_string();
                if extracted.chars().count() < 2 {
                    debug!("llm extraction too short, using cleaned query");
                    clean_search_query(text)
                } else {
                    extracted
                }
            }
            Err(e) => {
                debug!(error = %e, "llm extraction failed, using cleaned query");
                clean_search_query(text)
            }
        }
    }
}

/// Deterministic keyword cleaner used when the LLM extraction is
/// unavailable: strips availability phrasing and leading question words.
pub fn clean_search_query(text: &str) -> String {
    const STOP_PHRASES: &[&str] = &[
        "есть ли у вас",
        "продаете ли",
        "найдется ли",
        "имеется ли",
        "у вас есть",
        "есть в наличии",
        "в наличии",
        "можно ли купить",
        "можно ли заказать",
        "есть ли",
        "do you have",
        "do you sell",
        "can i buy",
        "can i order",
        "is there",
    ];
    let mut cleaned = text.to_lowercase();
    for phrase in STOP_PHRASES {
        cleaned = cleaned.replace(phrase, " ");
    }
    let cleaned = cleaned
        .trim_matches(|c: char| c.is_whitespace() || ",.!?;:".contains(c))
        .to_string();
    if cleaned.chars().count() < 3 {
        text.trim().to_string()
    } else {
        cleaned
    }
}

/// Pull lead fields out of a free-form contact request: a phone-looking
/// digit run, an email-looking token, and the first remaining name-like
/// token as the last name.
pub fn extract_contact_details(text: &str) -> LeadDraft {
    const REQUEST_WORDS: &[&str] = &[
        "свяжитесь", "связаться", "позвоните", "перезвоните", "напишите", "со", "мной", "мне",
        "меня", "пожалуйста", "менеджер", "менеджера", "нужен", "хочу", "прошу", "contact",
        "call", "me", "please", "my", "number", "phone", "email", "manager", "заказать",
        "на", "по", "за", "от", "до", "или", "это", "вот", "мой", "моя", "and", "or", "the",
        "at", "on", "in", "is", "it",
    ];

    let email = text
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric() && c != '@' && c != '.'))
        .find(|token| token.contains('@') && token.contains('.'))
        .map(String::from);

    let phone = extract_phone_candidate(text);

    let last_name = text
        .split(|c: char| c.is_whitespace() || ",.;:!?()".contains(c))
        .map(str::trim)
        .filter(|token| {
            token.chars().count() >= 2
                && token.chars().all(char::is_alphabetic)
                && !REQUEST_WORDS.contains(&token.to_lowercase().as_str())
        })
        .map(String::from)
        .next()
        .unwrap_or_default();

    LeadDraft {
        last_name,
        phone,
        email,
        question: text.to_string(),
        ..LeadDraft::default()
    }
}

/// The first run of phone-ish characters carrying at least seven digits.
fn extract_phone_candidate(text: &str) -> Option<String> {
    let mut current = String::new();
    let mut best: Option<String> = None;
    for c in text.chars() {
        if c.is_ascii_digit() || "+()- ".contains(c) {
            current.push(c);
        } else {
            consider_phone(&mut best, &current);
            current.clear();
        }
    }
    consider_phone(&mut best, &current);
    best
}

fn consider_phone(best: &mut Option<String>, candidate: &str) {
    let digits = candidate.chars().filter(|c| c.is_ascii_digit()).count();
    if digits >= 7 && best.is_none() {
        *best = Some(candidate.trim().to_string());
    }
}

fn to_chat_history(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|message| ChatMessage {
            role: message.role,
            content: message.content.clone(),
        })
        .collect()
}

fn format_products(results: &[ScoredProduct]) -> String {
    results
        .iter()
        .map(|scored| {
            let p = &scored.product;
            let mut line = format!(
                "- {} (article {}, category {})",
                p.product_name, p.article, p.category_1
            );
            if let Some(description) = &p.description {
                line.push_str(&format!(": {description}"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_services(services: &[kiosk_core::CompanyService]) -> String {
    services
        .iter()
        .map(|service| {
            let category = service.category.as_deref().unwrap_or("-");
            format!("- {} [{}]: {}", service.title, category, service.description)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn fallback_reply(intent: Intent) -> TurnReply {
    TurnReply {
        text: "Извините, произошла ошибка при обработке вашего запроса. Попробуйте еще раз \
               или свяжитесь с менеджером. / Sorry, something went wrong while processing \
               your request. Please try again or contact a manager."
            .to_string(),
        intent,
        suggested_actions: vec!["contact_manager".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_config::model::{CostConfig, LlmConfig, NotifyConfig, TelegramConfig};
    use kiosk_core::{LeadStatus, Product};
    use kiosk_cost::CostGuard;
    use kiosk_notify::{EmailNotifier, Notifiers, TelegramNotifier};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Catalog stub returning a fixed result set.
    struct StubCatalog {
        results: Vec<ScoredProduct>,
    }

    #[async_trait]
    impl ProductSearch for StubCatalog {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<ScoredProduct>, KioskError> {
            Ok(self.results.clone())
        }
    }

    fn laptop_result() -> ScoredProduct {
        ScoredProduct {
            product: Product {
                id: "P-001".into(),
                product_name: "Ноутбук бизнес-класса".into(),
                category_1: "Электроника".into(),
                article: "DL001".into(),
                description: None,
                category_2: None,
                category_3: None,
                photo_url: None,
                page_url: None,
            },
            score: 0.92,
            raw_score: 0.72,
        }
    }

    fn notifiers() -> Arc<Notifiers> {
        let notify = NotifyConfig::default();
        Arc::new(Notifiers::new(
            TelegramNotifier::new(&TelegramConfig::default(), &notify),
            EmailNotifier::new(notify),
        ))
    }

    async fn orchestrator_against(
        server: &MockServer,
        results: Vec<ScoredProduct>,
    ) -> (Arc<Orchestrator>, Database) {
        let db = Database::open_in_memory().await.unwrap();
        let logger = HybridLogger::new(db.clone(), notifiers());
        let guard = CostGuard::new(db.clone(), CostConfig::default(), logger.clone());

        queries::settings::set_active_provider(
            &db,
            "openai",
            &serde_json::json!({"api_key": "sk-test", "base_url": server.uri()}).to_string(),
        )
        .await
        .unwrap();
        let gateway = LlmGateway::new(db.clone(), LlmConfig::default(), guard)
            .await
            .unwrap();

        let prompts = PromptRegistry::new(db.clone());
        prompts.seed_defaults().await.unwrap();

        let conversations = ConversationStore::new(db.clone());
        let classifier = QueryClassifier::new(gateway.clone(), prompts.clone());
        let leads = LeadPipeline::new(db.clone(), notifiers(), logger.clone());
        let orchestrator = Orchestrator::new(
            db.clone(),
            conversations,
            classifier,
            Arc::new(StubCatalog { results }),
            KnowledgeStore::new(db.clone()),
            gateway,
            prompts,
            leads,
            logger,
            None,
        );
        (orchestrator, db)
    }

    fn llm_reply(text: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": text}}],
            "usage": {"prompt_tokens": 20, "completion_tokens": 10, "total_tokens": 30}
        })
    }

    async fn mount_llm(server: &MockServer, text: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(llm_reply(text)))
            .mount(server)
            .await;
    }

    async fn stored_messages(db: &Database, chat_id: &str) -> Vec<Message> {
        let conv = queries::conversations::open_or_get(db, chat_id, "telegram")
            .await
            .unwrap();
        queries::messages::all_messages(db, &conv.id).await.unwrap()
    }

    #[tokio::test]
    async fn product_turn_stores_intent_metadata() {
        let server = MockServer::start().await;
        mount_llm(&server, "Могу предложить Ноутбук бизнес-класса, артикул DL001.").await;
        let (orchestrator, db) = orchestrator_against(&server, vec![laptop_result()]).await;

        let reply = orchestrator
            .handle_turn(
                "chat-1",
                "telegram",
                "нужен ноутбук для работы",
                &SenderProfile::default(),
            )
            .await
            .unwrap();

        assert_eq!(reply.intent, Intent::Product);
        assert!(reply.text.contains("DL001"));

        let messages = stored_messages(&db, "chat-1").await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        let metadata = messages[1].metadata.as_deref().unwrap();
        assert!(metadata.contains("\"PRODUCT\""));
    }

    #[tokio::test]
    async fn empty_product_result_still_replies_and_suggests_manager() {
        let server = MockServer::start().await;
        mount_llm(&server, "К сожалению, ничего не нашлось. Свяжитесь с менеджером.").await;
        let (orchestrator, db) = orchestrator_against(&server, vec![]).await;

        let reply = orchestrator
            .handle_turn(
                "chat-1",
                "telegram",
                "нужен квантовый сноуборд",
                &SenderProfile::default(),
            )
            .await
            .unwrap();

        assert_eq!(reply.intent, Intent::Product);
        assert!(!reply.text.is_empty());
        assert!(reply
            .suggested_actions
            .contains(&"contact_manager".to_string()));

        // No lead was created automatically.
        let pending = queries::leads::open_pending_lead(&db, "chat-1").await.unwrap();
        assert!(pending.is_none());
    }

    #[tokio::test]
    async fn contact_turn_captures_lead() {
        let server = MockServer::start().await;
        mount_llm(&server, "Спасибо, Иванов! Менеджер свяжется с вами.").await;
        let (orchestrator, db) = orchestrator_against(&server, vec![]).await;

        let reply = orchestrator
            .handle_turn(
                "chat-1",
                "telegram",
                "свяжитесь со мной, +79001234567, Иванов",
                &SenderProfile::default(),
            )
            .await
            .unwrap();

        assert_eq!(reply.intent, Intent::Contact);
        let lead = queries::leads::open_pending_lead(&db, "chat-1")
            .await
            .unwrap()
            .expect("lead must be captured");
        assert_eq!(lead.last_name, "Иванов");
        assert_eq!(lead.phone.as_deref(), Some("+79001234567"));
        assert_eq!(lead.status, LeadStatus::PendingSync);
        assert_eq!(lead.source.to_string(), "TG");
    }

    #[tokio::test]
    async fn contact_without_details_asks_for_them() {
        let server = MockServer::start().await;
        mount_llm(&server, "Пожалуйста, оставьте фамилию и телефон или email.").await;
        let (orchestrator, db) = orchestrator_against(&server, vec![]).await;

        let reply = orchestrator
            .handle_turn(
                "chat-1",
                "telegram",
                "позовите менеджера",
                &SenderProfile::default(),
            )
            .await
            .unwrap();

        assert_eq!(reply.intent, Intent::Contact);
        assert!(reply
            .suggested_actions
            .contains(&"provide_contacts".to_string()));
        assert!(queries::leads::open_pending_lead(&db, "chat-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn llm_failure_produces_fallback_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let (orchestrator, db) = orchestrator_against(&server, vec![]).await;

        let reply = orchestrator
            .handle_turn("chat-1", "telegram", "привет", &SenderProfile::default())
            .await
            .unwrap();
        assert!(reply.text.contains("Извините") || reply.text.contains("Sorry"));

        // Both the user turn and the fallback reply are stored.
        let messages = stored_messages(&db, "chat-1").await;
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn turns_from_one_chat_are_serialized() {
        let server = MockServer::start().await;
        mount_llm(&server, "ответ").await;
        let (orchestrator, db) = orchestrator_against(&server, vec![laptop_result()]).await;

        let a = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .handle_turn("chat-1", "telegram", "нужен ноутбук", &SenderProfile::default())
                    .await
                    .unwrap()
            })
        };
        let b = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .handle_turn("chat-1", "telegram", "нужен насос", &SenderProfile::default())
                    .await
                    .unwrap()
            })
        };
        a.await.unwrap();
        b.await.unwrap();

        let messages = stored_messages(&db, "chat-1").await;
        assert_eq!(messages.len(), 4);
        // Whichever turn ran first, roles must strictly alternate.
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
    }

    #[test]
    fn contact_extraction_finds_phone_and_name() {
        let draft = extract_contact_details("свяжитесь со мной, +79001234567, Иванов");
        assert_eq!(draft.phone.as_deref(), Some("+79001234567"));
        assert_eq!(draft.last_name, "Иванов");
        assert!(draft.email.is_none());
    }

    #[test]
    fn contact_extraction_finds_email() {
        let draft = extract_contact_details("напишите мне на ivanov@example.com, Петров");
        assert_eq!(draft.email.as_deref(), Some("ivanov@example.com"));
        assert_eq!(draft.last_name, "Петров");
    }

    #[test]
    fn contact_extraction_handles_missing_fields() {
        let draft = extract_contact_details("позовите менеджера");
        assert!(draft.phone.is_none());
        assert!(draft.email.is_none());
        assert!(draft.last_name.is_empty());
    }

    #[test]
    fn clean_search_query_strips_availability_phrases() {
        assert_eq!(clean_search_query("есть ли у вас сверло без керна?"), "сверло без керна");
        assert_eq!(clean_search_query("do you have bearings 6205"), "bearings 6205");
    }

    #[test]
    fn clean_search_query_keeps_short_queries_intact() {
        assert_eq!(clean_search_query("DL001"), "DL001");
    }
}
