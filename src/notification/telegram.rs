use std::time::Duration;
use tokio::sync::mpsc;
use tracing::error;

use crate::config::TelegramConfig;
use crate::notification::{Event, NotificationError, Notifier, Recipient, format_event};

const TELEGRAM_API_URL: &str = "https://api.telegram.org";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_MESSAGE_LENGTH: usize = 4096;
const ASYNC_QUEUE_SIZE: usize = 100;

/// Куда и кому отправлять уведомления
#[derive(Debug, Clone)]
struct Routing {
    operator_chat_id: i64,
    notify_operators: bool,
    notify_clients: bool,
}

impl Routing {
    fn is_enabled(&self, recipient: Recipient) -> bool {
        match recipient {
            Recipient::Operators => self.notify_operators && self.operator_chat_id != 0,
            Recipient::Client(_) => self.notify_clients,
        }
    }

    /// Клиенту пишем в личный чат: его chat_id совпадает с user_id
    fn chat_id(&self, recipient: Recipient) -> i64 {
        match recipient {
            Recipient::Operators => self.operator_chat_id,
            Recipient::Client(user_id) => user_id,
        }
    }
}

/// Telegram Notifier для отправки уведомлений через Telegram Bot API
pub struct TelegramNotifier {
    routing: Routing,
    http_client: reqwest::Client,
    api_url: String,
    sender: mpsc::Sender<Event>,
}

impl TelegramNotifier {
    /// Создает новый TelegramNotifier
    pub fn new(config: &TelegramConfig, operator_chat_id: i64) -> Result<Self, NotificationError> {
        Self::with_api_url(config, operator_chat_id, TELEGRAM_API_URL)
    }

    /// Создает TelegramNotifier с другим адресом Bot API
    pub fn with_api_url(
        config: &TelegramConfig,
        operator_chat_id: i64,
        base_url: &str,
    ) -> Result<Self, NotificationError> {
        if config.bot_token.is_empty() {
            return Err(NotificationError::new("bot_token is required"));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::new(format!("Failed to create HTTP client: {}", e)))?;

        let api_url = format!(
            "{}/bot{}",
            base_url.trim_end_matches('/'),
            config.bot_token
        );

        let routing = Routing {
            operator_chat_id,
            notify_operators: config.notify_operators,
            notify_clients: config.notify_clients,
        };

        let (sender, receiver) = mpsc::channel(ASYNC_QUEUE_SIZE);

        // Запускаем воркер для асинхронной обработки
        Self::spawn_worker(receiver, routing.clone(), http_client.clone(), api_url.clone());

        Ok(Self {
            routing,
            http_client,
            api_url,
            sender,
        })
    }

    fn spawn_worker(
        mut receiver: mpsc::Receiver<Event>,
        routing: Routing,
        http_client: reqwest::Client,
        api_url: String,
    ) {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let chat_id = routing.chat_id(event.recipient);
                let text = format_event(&event);

                if let Err(e) =
                    Self::send_message_to_chat_static(&http_client, &api_url, chat_id, &text).await
                {
                    error!(
                        error = %e,
                        event = %event.event_type,
                        recipient = %event.recipient,
                        "Failed to send Telegram message"
                    );
                }
            }
        });
    }

    async fn send_message_to_chat_static(
        http_client: &reqwest::Client,
        api_url: &str,
        chat_id: i64,
        text: &str,
    ) -> Result<(), NotificationError> {
        let url = format!("{}/sendMessage", api_url);

        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": truncate(text, MAX_MESSAGE_LENGTH),
            "parse_mode": "HTML"
        });

        let response = http_client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::new(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NotificationError::new(format!(
                "Telegram API error: {} - {}",
                status, body
            )));
        }

        Ok(())
    }
}

/// Обрезает сообщение до лимита Telegram, не разрывая символы
fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        if !self.is_enabled(event.recipient) {
            return Ok(());
        }

        let chat_id = self.routing.chat_id(event.recipient);
        let text = format_event(event);
        Self::send_message_to_chat_static(&self.http_client, &self.api_url, chat_id, &text).await
    }

    fn send_async(&self, event: Event) {
        if !self.is_enabled(event.recipient) {
            return;
        }

        if let Err(e) = self.sender.try_send(event) {
            error!(error = %e, "Failed to queue Telegram message");
        }
    }

    fn is_enabled(&self, recipient: Recipient) -> bool {
        self.routing.is_enabled(recipient)
    }

    async fn close(&self) -> Result<(), NotificationError> {
        // Даем время воркеру обработать оставшиеся сообщения
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }
}
