//! Command dispatcher: turns one inbound group message into at most one
//! reply.
//!
//! Order of checks: admin group scope, grammar, sender authorization, help
//! shortcut, target group validation, receiver allow-list, then per-command
//! routing.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use herald_command::grammar::{self, Command, CommandKind, Parsed};
use herald_command::{cq, markup};
use herald_config::HeraldConfig;
use herald_cron::{JobKind, ScheduledJob};
use herald_types::{GroupId, InboundEvent, MessageId, MessageSegment};

use crate::lifecycle::{ListFilter, TaskLifecycleManager};
use crate::transport::MessageTransport;

pub const HELP_TEXT: &str = "\
Herald message manager - available commands:
Format: [command][timestamp][content][target group]

1. sendmessage: send a message
   - timestamp: 0 (now) or YYYYMMDDHHMM(SS) (scheduled)
   - content: plain text, {at_all}, \\n (line break) and `{:Image(url=\"...\")}` images
   - example: `[sendmessage][202509201200][Hello everyone][123456]`

2. forwardmessage: forward a message (reply to the message to forward)
   - timestamp: 0 (now) or YYYYMMDDHHMM(SS) (scheduled)
   - content: leave empty
   - example: `[forwardmessage][0][][123456]`

3. recallmessage: recall a message
   - timestamp: 0
   - content: MessageID of the message to recall
   - target group: required by the format, not used
   - or reply to the message to recall; content and group are then ignored
   - example: `[recallmessage][0][12345][654321]`

4. cancelmessage: cancel a scheduled task
   - timestamp: -1
   - content: JobID of the task
   - example: `[cancelmessage][-1][job_...][0]`

5. schedulemessage: list scheduled tasks
   - timestamp/content/target group: optional filters (exact time, content regex, group)
   - example: `[schedulemessage][][][123456]`
";

const TIMESTAMP_FORMAT_ERROR: &str =
    "Invalid timestamp format. Please use YYYYMMDDHHMMSS or YYYYMMDDHHMM.";

const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Characters of job content shown by the schedule listing.
const LIST_PREVIEW_CHARS: usize = 30;

/// Parse a `YYYYMMDDHHMM` or `YYYYMMDDHHMMSS` field.
///
/// Returns `None` for anything else, including impossible dates.
pub fn parse_send_time(field: &str) -> Option<NaiveDateTime> {
    if !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match field.len() {
        14 => NaiveDateTime::parse_from_str(field, "%Y%m%d%H%M%S").ok(),
        12 => NaiveDateTime::parse_from_str(&format!("{field}00"), "%Y%m%d%H%M%S").ok(),
        _ => None,
    }
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Render the schedule listing.
pub fn render_jobs(jobs: &[ScheduledJob]) -> String {
    let mut response = String::from("Scheduled Tasks:\n");
    for job in jobs {
        let preview: String = job
            .content
            .chars()
            .take(LIST_PREVIEW_CHARS)
            .filter(|&c| c != '`')
            .collect();
        response.push_str(&format!(
            "  - JobID: {}\n    Time: {}\n    Group: {}\n    Content: `{preview}...`\n",
            job.id,
            job.timestamp.format(DISPLAY_TIME_FORMAT),
            job.target_group,
        ));
    }
    response
}

/// Where an immediate or scheduled delivery gets its content from.
enum Delivery<'a> {
    Send { body: &'a str },
    Forward { segments: &'a [MessageSegment] },
}

impl Delivery<'_> {
    fn kind(&self) -> JobKind {
        match self {
            Self::Send { .. } => JobKind::SendMessage,
            Self::Forward { .. } => JobKind::ForwardMessage,
        }
    }

    fn segments(&self) -> Vec<MessageSegment> {
        match self {
            Self::Send { body } => markup::parse_content(body),
            Self::Forward { segments } => segments.to_vec(),
        }
    }

    fn stored_content(&self) -> String {
        match self {
            Self::Send { body } => body.to_string(),
            Self::Forward { segments } => cq::encode(segments),
        }
    }
}

/// Entry point for inbound command messages.
pub struct CommandDispatcher {
    config: Arc<HeraldConfig>,
    lifecycle: Arc<TaskLifecycleManager>,
    transport: Arc<dyn MessageTransport>,
}

impl CommandDispatcher {
    pub fn new(
        config: Arc<HeraldConfig>,
        lifecycle: Arc<TaskLifecycleManager>,
        transport: Arc<dyn MessageTransport>,
    ) -> Self {
        Self {
            config,
            lifecycle,
            transport,
        }
    }

    /// Handle one inbound event. Returns the reply to post back to the
    /// originating group, or `None` when the event is silently ignored.
    pub async fn handle(&self, event: &InboundEvent) -> Option<String> {
        if !self.config.is_admin_group(event.group_id) {
            return None;
        }

        // Ordinary chat is never answered, whoever sends it.
        let parsed = grammar::parse(&event.plain_text).ok()?;

        if !self.config.is_authorized(event.user_id) {
            return Some("You are not authorized to use this command.".into());
        }

        let command = match parsed {
            Parsed::Help => return Some(HELP_TEXT.into()),
            Parsed::Command(command) => command,
        };

        let is_list = command.kind == CommandKind::ListSchedule;
        if !is_numeric(&command.target_group) && !is_list {
            return Some("Invalid target group number.".into());
        }
        // Digit strings too long for a group id are treated like any other
        // unknown group.
        let target_group: GroupId = if is_numeric(&command.target_group) {
            command.target_group.parse().unwrap_or(GroupId::MAX)
        } else {
            0
        };

        if target_group != 0 && !self.config.is_receiver_group(target_group) {
            return Some(format!(
                "Group {} is not in the receiver groups list.",
                command.target_group
            ));
        }

        info!(
            user_id = event.user_id,
            group_id = event.group_id,
            "Received command [{}][{}][...][{}]",
            command.kind,
            command.timestamp,
            command.target_group
        );

        match &command.kind {
            CommandKind::SendMessage => {
                let delivery = Delivery::Send {
                    body: &command.content,
                };
                Some(self.deliver(&command, delivery, target_group).await)
            }
            CommandKind::ForwardMessage => {
                let Some(reply) = &event.reply else {
                    return Some(
                        "The `forwardmessage` command must be used by replying to a message."
                            .into(),
                    );
                };
                let delivery = Delivery::Forward {
                    segments: &reply.segments,
                };
                Some(self.deliver(&command, delivery, target_group).await)
            }
            CommandKind::RecallMessage => Some(self.recall(event, &command).await),
            CommandKind::ListSchedule => Some(self.list(&command)),
            CommandKind::CancelMessage => Some(self.cancel(&command)),
            CommandKind::Unknown(keyword) => {
                info!(%keyword, "Ignoring unknown command keyword");
                None
            }
        }
    }

    async fn deliver(
        &self,
        command: &Command,
        delivery: Delivery<'_>,
        target_group: GroupId,
    ) -> String {
        let (sent, action) = match delivery {
            Delivery::Send { .. } => ("sent", "send message"),
            Delivery::Forward { .. } => ("forwarded", "forward message"),
        };

        if command.timestamp == "0" {
            return match self
                .transport
                .send_group_message(target_group, delivery.segments())
                .await
            {
                Ok(message_id) => {
                    info!(target_group, message_id, "Message {sent}");
                    format!("Message {sent} to group {target_group}. MessageID: {message_id}")
                }
                Err(e) => {
                    warn!(target_group, "Failed to {action}: {e:#}");
                    format!("Failed to {action}: {e:#}")
                }
            };
        }

        let Some(send_time) = parse_send_time(&command.timestamp) else {
            return TIMESTAMP_FORMAT_ERROR.into();
        };

        let (label, failure) = match delivery {
            Delivery::Send { .. } => ("Message", "schedule message"),
            Delivery::Forward { .. } => ("Forward message", "schedule forward"),
        };

        match self.lifecycle.schedule(
            delivery.kind(),
            delivery.stored_content(),
            target_group,
            send_time,
        ) {
            Ok(job_id) => format!(
                "{label} scheduled for {} to group {target_group}. JobID: {job_id}",
                send_time.format(DISPLAY_TIME_FORMAT)
            ),
            Err(e) => {
                warn!(target_group, "Failed to {failure}: {e}");
                format!("Failed to {failure}: {e}")
            }
        }
    }

    async fn recall(&self, event: &InboundEvent, command: &Command) -> String {
        if let Some(reply) = &event.reply {
            match self.recall_by_id(reply.message_id).await {
                Ok(text) => return text,
                Err(e) => warn!(
                    message_id = reply.message_id,
                    "Could not recall from reply, falling back to content: {e:#}"
                ),
            }
        }

        let message_id: MessageId = match command.content.parse() {
            Ok(id) if is_numeric(&command.content) => id,
            _ => {
                return "Invalid MessageID. Provide a numeric MessageID or reply to the message to recall."
                    .into();
            }
        };

        match self.recall_by_id(message_id).await {
            Ok(text) => text,
            Err(e) => {
                warn!(message_id, "Failed to recall message: {e:#}");
                format!("Failed to recall message: {e:#}")
            }
        }
    }

    async fn recall_by_id(&self, message_id: MessageId) -> anyhow::Result<String> {
        self.transport.delete_message(message_id).await?;
        info!(message_id, "Recalled message");
        Ok(format!("Message {message_id} has been recalled."))
    }

    fn list(&self, command: &Command) -> String {
        if self.lifecycle.jobs().is_empty() {
            return "The schedule queue is empty.".into();
        }

        let filter = ListFilter {
            // An unparseable time filter is ignored.
            timestamp: parse_send_time(&command.timestamp),
            content: Some(command.content.clone()).filter(|c| !c.is_empty()),
            target_group: if is_numeric(&command.target_group) {
                command.target_group.parse().ok()
            } else {
                None
            },
        };

        match self.lifecycle.list(&filter) {
            Ok(matched) if matched.is_empty() => "No scheduled tasks match your criteria.".into(),
            Ok(matched) => render_jobs(&matched),
            Err(e) => {
                warn!("Rejected schedule filter: {e}");
                "Invalid regular expression for content filtering.".into()
            }
        }
    }

    fn cancel(&self, command: &Command) -> String {
        if command.timestamp != "-1" {
            return "To cancel a task, the timestamp must be -1.".into();
        }

        let job_id = &command.content;
        match self.lifecycle.cancel(job_id) {
            Ok(outcome) if outcome.found() => format!("Scheduled job {job_id} has been canceled."),
            Ok(_) => format!("Failed to cancel job {job_id}: no job by the id of {job_id} was found"),
            Err(e) => format!("Failed to cancel job {job_id}: {e}"),
        }
    }
}
