use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{Direction, Order, PaymentType};

/// Тип события уведомления
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Процессор подтвердил оплату клиента
    PaymentReceived,
    /// Оператор отправил актив, заявка завершена
    OrderCompleted,
    /// Заявка отменена
    OrderCancelled,
    /// Заявка требует ручной обработки
    OrderProblem,
    /// Произошла ошибка
    Error,
    /// Сервис запущен
    Startup,
    /// Сервис остановлен
    Shutdown,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::PaymentReceived => write!(f, "payment_received"),
            EventType::OrderCompleted => write!(f, "order_completed"),
            EventType::OrderCancelled => write!(f, "order_cancelled"),
            EventType::OrderProblem => write!(f, "order_problem"),
            EventType::Error => write!(f, "error"),
            EventType::Startup => write!(f, "startup"),
            EventType::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Получатель уведомления
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Чат операторов
    Operators,
    /// Клиент, владелец заявки
    Client(i64),
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Operators => write!(f, "operators"),
            Recipient::Client(id) => write!(f, "client:{}", id),
        }
    }
}

/// Причина отмены заявки
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Клиент отменил заявку сам
    ClientRequest,
    /// Оператор не получил оплату
    PaymentNotReceived,
    /// Процессор отменил заявку
    Processor,
    /// Истекло время оплаты
    Expired,
}

/// Данные об ошибке
#[derive(Debug, Clone)]
pub struct ErrorData {
    pub component: String,
    pub message: String,
    pub error: Option<String>,
}

/// Данные о запуске сервиса
#[derive(Debug, Clone)]
pub struct StartupData {
    pub version: String,
    pub processor: String,
    pub webhook_addr: String,
}

/// Данные об остановке сервиса
#[derive(Debug, Clone)]
pub struct ShutdownData {
    pub reason: String,
    pub uptime: Duration,
}

/// Данные события
#[derive(Debug, Clone)]
pub enum EventData {
    PaymentReceived(Order),
    OrderCompleted(Order),
    OrderCancelled { order: Order, reason: CancelReason },
    OrderProblem { order: Order, note: String },
    Error(ErrorData),
    Startup(StartupData),
    Shutdown(ShutdownData),
}

/// Событие уведомления
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub recipient: Recipient,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl Event {
    pub fn new(event_type: EventType, recipient: Recipient, data: EventData) -> Self {
        Self {
            event_type,
            recipient,
            timestamp: Utc::now(),
            data,
        }
    }

    /// Операторам: клиент оплатил, нужно отправить актив
    pub fn payment_received_operators(order: &Order) -> Self {
        Self::new(
            EventType::PaymentReceived,
            Recipient::Operators,
            EventData::PaymentReceived(order.clone()),
        )
    }

    /// Клиенту: оплата получена
    pub fn payment_received_client(order: &Order) -> Self {
        Self::new(
            EventType::PaymentReceived,
            Recipient::Client(order.user_id),
            EventData::PaymentReceived(order.clone()),
        )
    }

    pub fn order_completed(order: &Order) -> Self {
        Self::new(
            EventType::OrderCompleted,
            Recipient::Client(order.user_id),
            EventData::OrderCompleted(order.clone()),
        )
    }

    pub fn order_cancelled(order: &Order, reason: CancelReason) -> Self {
        Self::new(
            EventType::OrderCancelled,
            Recipient::Client(order.user_id),
            EventData::OrderCancelled {
                order: order.clone(),
                reason,
            },
        )
    }

    pub fn order_problem(order: &Order, note: impl Into<String>) -> Self {
        Self::new(
            EventType::OrderProblem,
            Recipient::Operators,
            EventData::OrderProblem {
                order: order.clone(),
                note: note.into(),
            },
        )
    }

    pub fn error(data: ErrorData) -> Self {
        Self::new(EventType::Error, Recipient::Operators, EventData::Error(data))
    }

    pub fn startup(data: StartupData) -> Self {
        Self::new(
            EventType::Startup,
            Recipient::Operators,
            EventData::Startup(data),
        )
    }

    pub fn shutdown(data: ShutdownData) -> Self {
        Self::new(
            EventType::Shutdown,
            Recipient::Operators,
            EventData::Shutdown(data),
        )
    }
}

/// Трейт для отправки уведомлений
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Отправить уведомление и дождаться результата
    async fn send(&self, event: &Event) -> Result<(), NotificationError>;

    /// Поставить уведомление в очередь (без блокировки)
    fn send_async(&self, event: Event);

    /// Проверить, включены ли уведомления для получателя
    fn is_enabled(&self, recipient: Recipient) -> bool;

    /// Закрыть notifier
    async fn close(&self) -> Result<(), NotificationError>;
}

/// Ошибка уведомления
#[derive(Debug, Clone, Error)]
#[error("NotificationError: {message}")]
pub struct NotificationError {
    pub message: String,
}

impl NotificationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// LogNotifier пишет уведомления в лог, когда Telegram выключен
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        tracing::info!(
            event = %event.event_type,
            recipient = %event.recipient,
            text = %format_event(event),
            "Notification"
        );
        Ok(())
    }

    fn send_async(&self, event: Event) {
        tracing::info!(
            event = %event.event_type,
            recipient = %event.recipient,
            text = %format_event(&event),
            "Notification"
        );
    }

    fn is_enabled(&self, _recipient: Recipient) -> bool {
        true
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

// === Функции форматирования ===

/// Операторам: оплата получена, нужно отправить актив
pub fn format_payment_received_operators(order: &Order) -> String {
    let header = if order.is_problematic {
        "⚠️ <b>ПРОБЛЕМНАЯ ЗАЯВКА</b>"
    } else {
        "💳 <b>Оплаченная заявка</b>"
    };

    let received = order
        .received_amount
        .map(|a| format!("\n📥 Получено: {}", format_rub(a)))
        .unwrap_or_default();

    format!(
        "{}\n\n\
         🆔 Заявка: #{}\n\
         👤 Пользователь: <code>{}</code>\n\
         🔁 Операция: {}\n\
         💰 Сумма: {}{}\n\
         ₿ Bitcoin: {} BTC\n\
         📱 Тип оплаты: {}\n\n\
         📋 Реквизиты:\n{}\n\n\
         {}: <code>{}</code>",
        header,
        order.display_id(),
        order.user_id,
        direction_label(order.direction),
        format_rub(order.total_amount),
        received,
        format_btc(order.amount_crypto),
        payment_type_label(order.payment_type),
        escape_html(order.requisites.as_deref().unwrap_or("—")),
        destination_label(order.direction),
        escape_html(&order.destination),
    )
}

/// Клиенту: оплата получена
pub fn format_payment_received_client(order: &Order) -> String {
    format!(
        "✅ <b>Оплата по заявке #{} получена</b>\n\n\
         💰 Сумма: {}\n\
         Оператор проверяет платеж и скоро отправит средства.",
        order.display_id(),
        format_rub(order.total_amount),
    )
}

pub fn format_order_completed(order: &Order) -> String {
    let body = match order.direction {
        Direction::Buy => format!(
            "Bitcoin отправлен на адрес <code>{}</code>.\n\
             Время поступления: до 1 часа.",
            escape_html(&order.destination)
        ),
        Direction::Sell => format!(
            "Средства отправлены на реквизиты <code>{}</code>.",
            escape_html(&order.destination)
        ),
    };

    format!(
        "✅ <b>Заявка #{} выполнена!</b>\n\n\
         Ваш платеж подтвержден.\n{}",
        order.display_id(),
        body
    )
}

pub fn format_order_cancelled(order: &Order, reason: CancelReason) -> String {
    let reason_text = match reason {
        CancelReason::ClientRequest => "Заявка отменена по вашему запросу.",
        CancelReason::PaymentNotReceived => {
            "Платеж не был получен в установленное время.\n\
             Если вы считаете это ошибкой, обратитесь в поддержку."
        }
        CancelReason::Processor => "Платежная система отменила заявку.",
        CancelReason::Expired => "Истекло время оплаты (30 минут).",
    };

    format!(
        "❌ <b>Заявка #{} отменена</b>\n\n{}",
        order.display_id(),
        reason_text
    )
}

pub fn format_order_problem(order: &Order, note: &str) -> String {
    format!(
        "⚠️ <b>Заявка #{} требует внимания</b>\n\n\
         Статус: {}\n\
         💰 Сумма: {}\n\
         📝 {}",
        order.display_id(),
        order.status,
        format_rub(order.total_amount),
        escape_html(note),
    )
}

/// Форматирует ошибку
pub fn format_error(data: &ErrorData) -> String {
    let error_str = data
        .error
        .as_ref()
        .map(|e| format!("\nОшибка: {}", escape_html(e)))
        .unwrap_or_default();

    format!(
        "⚠️ <b>Ошибка</b>\n\n\
         Компонент: {}\n\
         Сообщение: {}{}\n\n\
         ⏰ {}",
        data.component,
        escape_html(&data.message),
        error_str,
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Форматирует запуск сервиса
pub fn format_startup(data: &StartupData) -> String {
    format!(
        "🤖 <b>Обменник запущен</b>\n\n\
         Версия: {}\n\
         Процессор: {}\n\
         Webhook: {}\n\n\
         ⏰ {}",
        data.version,
        data.processor,
        data.webhook_addr,
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Форматирует остановку сервиса
pub fn format_shutdown(data: &ShutdownData) -> String {
    format!(
        "🛑 <b>Обменник остановлен</b>\n\n\
         Причина: {}\n\
         Время работы: {}\n\n\
         ⏰ {}",
        data.reason,
        format_duration(data.uptime),
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Форматирует событие в строку
pub fn format_event(event: &Event) -> String {
    match (&event.data, event.recipient) {
        (EventData::PaymentReceived(order), Recipient::Operators) => {
            format_payment_received_operators(order)
        }
        (EventData::PaymentReceived(order), Recipient::Client(_)) => {
            format_payment_received_client(order)
        }
        (EventData::OrderCompleted(order), _) => format_order_completed(order),
        (EventData::OrderCancelled { order, reason }, _) => format_order_cancelled(order, *reason),
        (EventData::OrderProblem { order, note }, _) => format_order_problem(order, note),
        (EventData::Error(data), _) => format_error(data),
        (EventData::Startup(data), _) => format_startup(data),
        (EventData::Shutdown(data), _) => format_shutdown(data),
    }
}

// === Вспомогательные функции ===

fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::Buy => "Покупка BTC",
        Direction::Sell => "Продажа BTC",
    }
}

fn destination_label(direction: Direction) -> &'static str {
    match direction {
        Direction::Buy => "₿ BTC адрес",
        Direction::Sell => "💳 Реквизиты клиента",
    }
}

fn payment_type_label(payment_type: PaymentType) -> &'static str {
    match payment_type {
        PaymentType::Card => "Карта",
        PaymentType::Sbp => "СБП",
    }
}

/// Рубли с двумя знаками и пробелами между разрядами: "1 155.00 ₽"
fn format_rub(amount: Decimal) -> String {
    let rounded = format!("{:.2}", amount.round_dp(2));
    let (sign, digits) = match rounded.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rounded.as_str()),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, "00"));

    format!(
        "{}{}.{} ₽",
        sign,
        add_thousand_separators(int_part),
        frac_part
    )
}

fn format_btc(amount: Decimal) -> String {
    format!("{:.8}", amount.round_dp(8))
}

/// Форматирует длительность
fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}с", secs)
    } else if secs < 3600 {
        format!("{}м {}с", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}ч {}м", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}д {}ч", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Добавляет пробелы между разрядами
fn add_thousand_separators(digits: &str) -> String {
    let mut result = String::new();
    for (i, c) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(' ');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Экранирует пользовательский текст для parse_mode=HTML
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
