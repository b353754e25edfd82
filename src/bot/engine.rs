//! Bot engine: executes exactly one handler per inbound message and keeps
//! the conversation log, profile history, and tracking state current.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::bot::dispatch::{self, Command};
use crate::bot::message::{BOT_SENDER, InboundMessage, SentMessage, StoredMessage, phone_number};
use crate::bot::prayer::{self, PrayerClient};
use crate::bot::state::{ReadStatus, StateTable, read_status_from_code, read_status_from_receipt};
use crate::bot::store::{ConversationStore, ProfileSnapshot};
use crate::bot::transport::{Presence, SessionEvent, Transport, TransportError};
use crate::gemini::{self, Responder};

const NO_MESSAGE_YET: &str = "لم أرسل لك أي رسالة بعد.";
const NO_REACTION: &str = "لا يوجد تفاعل";
const SEEN: &str = "تمت المشاهدة";
const NOT_SEEN_YET: &str = "لم تتم المشاهدة بعد";

const UNAVAILABLE: &str = "غير متوفر";
const BUSINESS_ACCOUNT: &str = "حساب تجاري";
const PERSONAL_ACCOUNT: &str = "حساب شخصي";
const ACCOUNT_TYPE_BLOCKED: &str = "لا يمكن تحديد (خطأ أو إعدادات الخصوصية)";
const AVATAR_BLOCKED: &str = "لا يمكن الوصول إليه (خطأ أو إعدادات الخصوصية)";
const AVATAR_PLACEHOLDER: &str = "https://via.placeholder.com/50";

const INVITE_USAGE: &str = "يرجى إرسال رابط مجموعة واتساب صالح بعد الأمر. مثال:\n!معلومات-الجروب https://chat.whatsapp.com/ABCDEFG";
const INVITE_EXTRACT_FAILED: &str = "لم أتمكن من استخراج رمز الدعوة من الرابط.";
const INVITE_LOOKUP_FAILED: &str =
    "عفوًا، لم أتمكن من الحصول على معلومات المجموعة. قد يكون الرابط غير صالح أو تم إبطاله.";
const SEARCHING_GROUP: &str = "جاري البحث عن معلومات المجموعة...";
const CREATOR_UNKNOWN: &str = "لم أتمكن من تحديد منشئ المجموعة.";
const NEVER_INTERACTED: &str = "غير معروف (لم يتفاعل مع البوت من قبل)";
const NO_AVATAR: &str = "لا توجد صورة للملف الشخصي أو أنها خاصة.";

const ANNOUNCE_HEADER: &str = "رسالة هامة للجميع:";
const INTERNAL_ERROR: &str = "Sorry, an internal error occurred.";

/// The invite-link path segment every valid link must contain.
const INVITE_PATH: &str = "chat.whatsapp.com/";

/// Zero-width characters that push the mention list behind the client's
/// "read more" fold.
const READ_MORE_PAD: usize = 4001;

pub struct BotEngine {
    transport: Arc<dyn Transport>,
    responder: Arc<dyn Responder>,
    store: ConversationStore,
    state: StateTable,
    prayer: PrayerClient,
    /// How many stored messages to hand the responder as history.
    history_limit: usize,
    invite_re: Regex,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

/// The announce broadcast: header, read-more fold, mention of every member.
fn announce_text(participants: &[String]) -> String {
    let fold: String = "\u{200C}".repeat(READ_MORE_PAD);
    let mentions: String = participants
        .iter()
        .map(|id| format!("@{} ", phone_number(id)))
        .collect();
    format!("{ANNOUNCE_HEADER}{fold}\n\n{mentions}")
}

impl BotEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        responder: Arc<dyn Responder>,
        store: ConversationStore,
        prayer: PrayerClient,
        history_limit: usize,
    ) -> Self {
        Self {
            transport,
            responder,
            store,
            state: StateTable::new(),
            prayer,
            history_limit,
            invite_re: Regex::new(r"chat\.whatsapp\.com/([A-Za-z0-9_-]+)").unwrap(),
        }
    }

    /// Consume one session event. Message events run a handler to
    /// completion; reaction and receipt events only touch tracking state.
    pub async fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Message(msg) => self.handle_message(msg).await,
            SessionEvent::Reaction(reaction) => {
                let applied = self.state.apply_reaction(
                    &reaction.conversation_id,
                    &reaction.message_id,
                    reaction.from_self,
                    &reaction.text,
                );
                if applied {
                    info!(
                        "Reaction \"{}\" from {} stored for message {}",
                        reaction.text, reaction.conversation_id, reaction.message_id
                    );
                }
            }
            SessionEvent::MessageStatus(update) => {
                if let Some(status) = read_status_from_code(update.status_code)
                    && self
                        .state
                        .apply_read_status(&update.conversation_id, &update.message_id, status)
                {
                    info!(
                        "Read receipt for {} stored for message {}",
                        update.conversation_id, update.message_id
                    );
                }
            }
            SessionEvent::Receipt(receipt) => {
                if let Some(status) = read_status_from_receipt(&receipt.receipt_type)
                    && self
                        .state
                        .apply_read_status(&receipt.conversation_id, &receipt.message_id, status)
                {
                    info!(
                        "Read receipt (via receipt feed) for {} stored for message {}",
                        receipt.conversation_id, receipt.message_id
                    );
                }
            }
            SessionEvent::Connection(update) => {
                // Connection lifecycle belongs to the supervisor.
                debug!("Ignoring connection event: {update:?}");
            }
        }
    }

    /// Run exactly one handler for an inbound message.
    pub async fn handle_message(&self, msg: InboundMessage) {
        if msg.from_self || msg.is_broadcast() {
            return;
        }

        if msg.is_group() {
            // Groups recognize only the announce trigger; nothing else,
            // and never the AI fallback.
            if dispatch::is_announce(&msg.text) {
                self.handle_announce(&msg).await;
            }
            return;
        }

        if msg.text.is_empty() {
            return;
        }

        info!("📨 {}: \"{}\"", msg.conversation_id, preview(&msg.text));

        // Log the inbound message and keep the sender's profile history
        // current before any handler runs.
        self.store.append_message(
            &msg.conversation_id,
            &StoredMessage {
                message_id: msg.message_id.clone(),
                sender: msg.conversation_id.clone(),
                text: msg.text.clone(),
                timestamp: now(),
            },
        );
        self.update_profile_history(&msg).await;

        match Command::parse(&msg.text) {
            Command::StatusReport => self.handle_status_report(&msg).await,
            Command::MyNumber => self.handle_my_number(&msg).await,
            Command::MyInfo => self.handle_my_info(&msg).await,
            Command::GroupInfo => self.handle_group_info(&msg).await,
            Command::PrayerTimes => self.handle_prayer_times(&msg).await,
            Command::Chat => self.handle_chat(&msg).await,
        }
    }

    /// Send a reply, persist it, and overwrite the conversation's tracked
    /// last-sent entry (clearing reaction and read status).
    async fn send_tracked(&self, conversation_id: &str, text: &str) -> Result<(), TransportError> {
        let message_id = self.transport.send_message(conversation_id, text).await?;
        self.persist_bot_message(conversation_id, &message_id, text);
        self.state.record_send(SentMessage {
            conversation_id: conversation_id.to_string(),
            message_id,
            text: text.to_string(),
            sent_at: now(),
        });
        Ok(())
    }

    /// Send a validation-guidance reply. Persisted like any reply, but the
    /// tracking state is left untouched: guidance causes no state change.
    async fn send_guidance(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<String, TransportError> {
        let message_id = self.transport.send_message(conversation_id, text).await?;
        self.persist_bot_message(conversation_id, &message_id, text);
        Ok(message_id)
    }

    fn persist_bot_message(&self, conversation_id: &str, message_id: &str, text: &str) {
        self.store.append_message(
            conversation_id,
            &StoredMessage {
                message_id: message_id.to_string(),
                sender: BOT_SENDER.to_string(),
                text: text.to_string(),
                timestamp: now(),
            },
        );
    }

    /// Append a profile snapshot when the sender's name or avatar changed.
    async fn update_profile_history(&self, msg: &InboundMessage) {
        let conversation_id = &msg.conversation_id;
        let display_name = msg
            .display_name
            .clone()
            .unwrap_or_else(|| UNAVAILABLE.to_string());

        let avatar_url = match self.transport.profile_picture_url(conversation_id).await {
            Ok(url) => url,
            Err(e) => {
                warn!("Could not fetch profile picture for {}: {e}", conversation_id);
                AVATAR_PLACEHOLDER.to_string()
            }
        };

        let appended = self.store.record_profile(
            conversation_id,
            &ProfileSnapshot {
                display_name,
                avatar_url,
                captured_at: now(),
            },
        );
        if appended {
            info!("Profile changed for {}, snapshot appended", conversation_id);
        }
    }

    /// Report reaction and read status of the last tracked message.
    async fn handle_status_report(&self, msg: &InboundMessage) {
        let conversation_id = &msg.conversation_id;

        let Some(tracked) = self.state.tracked(conversation_id) else {
            if let Err(e) = self.send_guidance(conversation_id, NO_MESSAGE_YET).await {
                error!("Failed to send to {}: {e}", conversation_id);
            }
            return;
        };

        let reaction = tracked.reaction.unwrap_or_else(|| NO_REACTION.to_string());
        let read_status = match tracked.read_status {
            Some(ReadStatus::Read) => SEEN,
            _ => NOT_SEEN_YET,
        };

        let report = format!(
            "تقرير عن آخر رسالة أرسلتها لك:\n- التفاعل: {reaction}\n- حالة المشاهدة: {read_status}"
        );
        if let Err(e) = self.send_tracked(conversation_id, &report).await {
            error!("Failed to send to {}: {e}", conversation_id);
        }
    }

    /// Reply with the bare phone number behind the conversation identifier.
    async fn handle_my_number(&self, msg: &InboundMessage) {
        let number = phone_number(&msg.conversation_id).to_string();
        if let Err(e) = self.send_tracked(&msg.conversation_id, &number).await {
            error!("Failed to send to {}: {e}", msg.conversation_id);
        }
    }

    /// Reply with a four-line profile card for the sender.
    async fn handle_my_info(&self, msg: &InboundMessage) {
        let conversation_id = &msg.conversation_id;
        let short_id = phone_number(conversation_id);
        let display_name = msg.display_name.as_deref().unwrap_or(UNAVAILABLE);

        let account_type = match self.transport.business_profile(conversation_id).await {
            Ok(true) => BUSINESS_ACCOUNT,
            Ok(false) => PERSONAL_ACCOUNT,
            Err(e) => {
                warn!("Could not fetch business profile for {}: {e}", conversation_id);
                ACCOUNT_TYPE_BLOCKED
            }
        };

        let avatar_url = match self.transport.profile_picture_url(conversation_id).await {
            Ok(url) => url,
            Err(e) => {
                warn!("Could not fetch profile picture for {}: {e}", conversation_id);
                AVATAR_BLOCKED.to_string()
            }
        };

        let info = format!(
            "معلومات ملفك الشخصي:\n- رقم المعرف (JID): {short_id}\n- الاسم: {display_name}\n- نوع الحساب: {account_type}\n- رابط صورة الملف الشخصي: {avatar_url}"
        );
        if let Err(e) = self.send_tracked(conversation_id, &info).await {
            error!("Failed to send to {}: {e}", conversation_id);
        }
    }

    /// Resolve a group invite link to its creator's cached identity.
    async fn handle_group_info(&self, msg: &InboundMessage) {
        let conversation_id = &msg.conversation_id;

        let mut parts = msg.text.split_whitespace();
        let _token = parts.next();
        let link = parts.next().filter(|link| link.contains(INVITE_PATH));

        let Some(link) = link else {
            if let Err(e) = self.send_guidance(conversation_id, INVITE_USAGE).await {
                error!("Failed to send to {}: {e}", conversation_id);
            }
            return;
        };

        let code = self
            .invite_re
            .captures(link)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string());
        let Some(code) = code else {
            if let Err(e) = self
                .send_guidance(conversation_id, INVITE_EXTRACT_FAILED)
                .await
            {
                error!("Failed to send to {}: {e}", conversation_id);
            }
            return;
        };

        if let Err(e) = self.resolve_invite(conversation_id, &code).await {
            warn!("Group invite lookup failed for {}: {e}", conversation_id);
            if let Err(send_err) = self.send_tracked(conversation_id, INVITE_LOOKUP_FAILED).await {
                error!("Failed to send to {}: {send_err}", conversation_id);
            }
        }
    }

    async fn resolve_invite(
        &self,
        conversation_id: &str,
        invite_code: &str,
    ) -> Result<(), TransportError> {
        self.transport
            .send_message(conversation_id, SEARCHING_GROUP)
            .await?;

        let info = self.transport.invite_info(invite_code).await?;

        let Some(owner) = info.owner else {
            self.send_tracked(conversation_id, CREATOR_UNKNOWN).await?;
            return Ok(());
        };

        let owner_number = phone_number(&owner).to_string();
        // History-derived name, not a live fetch.
        let owner_name = self
            .store
            .display_name(&owner)
            .unwrap_or_else(|| NEVER_INTERACTED.to_string());

        let caption = format!(
            "*معلومات منشئ المجموعة*\n*اسم المجموعة:* {}\n---\n*الاسم:* {}\n*الرقم:* {}",
            info.subject, owner_name, owner_number
        );

        match self.transport.profile_picture_url(&owner).await {
            Ok(avatar_url) => {
                let message_id = self
                    .transport
                    .send_image(conversation_id, &avatar_url, &caption)
                    .await?;
                // Image bytes are never persisted, only a description.
                let description =
                    format!("Sent group creator info for {} (with image)", info.subject);
                self.persist_bot_message(conversation_id, &message_id, &description);
                self.state.record_send(SentMessage {
                    conversation_id: conversation_id.to_string(),
                    message_id,
                    text: description,
                    sent_at: now(),
                });
            }
            Err(e) => {
                warn!("Could not fetch profile picture for {}: {e}", owner);
                let text = format!("{caption}\n*الصورة:* {NO_AVATAR}");
                self.send_tracked(conversation_id, &text).await?;
            }
        }

        Ok(())
    }

    /// Fetch and format the fixed-city prayer schedule.
    async fn handle_prayer_times(&self, msg: &InboundMessage) {
        let conversation_id = &msg.conversation_id;

        let notice = format!(
            "جاري جلب مواقيت الصلاة في {}, {}...",
            prayer::CITY,
            prayer::COUNTRY
        );
        if let Err(e) = self.transport.send_message(conversation_id, &notice).await {
            error!("Failed to send to {}: {e}", conversation_id);
        }

        let reply = match self.prayer.fetch_timings().await {
            Ok(timings) => prayer::format_schedule(&timings),
            Err(e) => {
                warn!("Prayer times fetch failed: {e}");
                prayer::error_reply(&e)
            }
        };

        if let Err(e) = self.send_tracked(conversation_id, &reply).await {
            error!("Failed to send to {}: {e}", conversation_id);
        }
    }

    /// Default path: forward to the AI responder with stored history.
    async fn handle_chat(&self, msg: &InboundMessage) {
        let conversation_id = &msg.conversation_id;

        if let Err(e) = self.run_chat(conversation_id, &msg.text).await {
            error!("Error in fallback handler for {}: {e}", conversation_id);
            if let Err(send_err) = self.send_tracked(conversation_id, INTERNAL_ERROR).await {
                error!("Failed to send apology to {}: {send_err}", conversation_id);
            }
        }
    }

    async fn run_chat(&self, conversation_id: &str, prompt: &str) -> Result<(), TransportError> {
        self.transport
            .set_presence(conversation_id, Presence::Composing)
            .await?;

        let history = self.store.recent_messages(conversation_id, self.history_limit);
        let reply = match self.responder.reply(&history, prompt).await {
            Ok(text) => text,
            // Responder failures become apology replies and still flow
            // through the normal tracked-send path.
            Err(e) => {
                warn!("AI responder error: {e}");
                gemini::error_reply(&e)
            }
        };

        self.send_tracked(conversation_id, &reply).await?;

        self.transport
            .set_presence(conversation_id, Presence::Available)
            .await?;

        Ok(())
    }

    /// Group announce: mention every member, admins only.
    async fn handle_announce(&self, msg: &InboundMessage) {
        let conversation_id = &msg.conversation_id;
        let Some(sender) = msg.participant_id.as_deref() else {
            return;
        };

        let metadata = match self.transport.group_metadata(conversation_id).await {
            Ok(metadata) => metadata,
            Err(e) => {
                error!("Failed to handle announce in {}: {e}", conversation_id);
                return;
            }
        };

        let is_admin = metadata
            .participants
            .iter()
            .any(|p| p.id == sender && p.is_admin());
        if !is_admin {
            info!(
                "{} tried the announce command in {} without admin rank",
                sender, conversation_id
            );
            return;
        }

        let participants: Vec<String> =
            metadata.participants.iter().map(|p| p.id.clone()).collect();
        let text = announce_text(&participants);

        match self
            .transport
            .send_mentions(conversation_id, &text, &participants)
            .await
        {
            Ok(_) => info!(
                "Sent announce to {} members in {} for admin {}",
                participants.len(),
                conversation_id,
                sender
            ),
            Err(e) => error!("Failed to send announce in {}: {e}", conversation_id),
        }
    }
}
