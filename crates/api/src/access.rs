//! Room access control
//!
//! Customers receive a conversation access token when they open a
//! conversation: the hex HMAC-SHA256 of the conversation id under the server
//! secret. They present it on `conversation:join`. Staff sessions present the
//! shared staff token when connecting. Both comparisons are constant time.

use hmac::{digest::InvalidLength, Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use salonchat_shared::{ConversationId, MessageSender};

use crate::error::{RelayError, RelayResult};
use crate::websocket::connection::SessionRole;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_CONTEXT: &str = "salonchat:conversation:";

#[derive(Clone)]
pub struct RoomAccess {
    mac: HmacSha256,
    staff_token: Vec<u8>,
    enforce: bool,
}

impl RoomAccess {
    pub fn new(secret: &str, staff_token: &str, enforce: bool) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret.as_bytes())?,
            staff_token: staff_token.as_bytes().to_vec(),
            enforce,
        })
    }

    pub fn is_enforced(&self) -> bool {
        self.enforce
    }

    /// Access token for one conversation
    pub fn conversation_token(&self, id: ConversationId) -> String {
        let mut mac = self.mac.clone();
        mac.update(TOKEN_CONTEXT.as_bytes());
        mac.update(id.0.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn verify_conversation_token(&self, id: ConversationId, token: &str) -> bool {
        let expected = self.conversation_token(id);
        expected.as_bytes().ct_eq(token.trim().as_bytes()).into()
    }

    pub fn verify_staff_token(&self, token: &str) -> bool {
        if self.staff_token.is_empty() {
            return false;
        }
        self.staff_token.ct_eq(token.trim().as_bytes()).into()
    }

    /// Role for a socket or HTTP caller presenting `token`
    ///
    /// Only a valid staff token yields [`SessionRole::Staff`]. With enforcement
    /// off every caller may claim staff.
    pub fn resolve_role(&self, requested_staff: bool, token: Option<&str>) -> Option<SessionRole> {
        if !requested_staff {
            return Some(SessionRole::Customer);
        }
        if !self.enforce || token.map(|t| self.verify_staff_token(t)).unwrap_or(false) {
            Some(SessionRole::Staff)
        } else {
            None
        }
    }

    /// Check that `role` may read or join the conversation `id`
    pub fn authorize_conversation(
        &self,
        role: SessionRole,
        id: ConversationId,
        access_token: Option<&str>,
    ) -> RelayResult<()> {
        if !self.enforce || role == SessionRole::Staff {
            return Ok(());
        }
        match access_token {
            Some(token) if self.verify_conversation_token(id, token) => Ok(()),
            _ => Err(RelayError::Forbidden(
                "Access denied to conversation".to_string(),
            )),
        }
    }

    /// Customers may only speak as customers
    pub fn authorize_sender(&self, role: SessionRole, sender: MessageSender) -> RelayResult<()> {
        if self.enforce && role == SessionRole::Customer && sender != MessageSender::Customer {
            return Err(RelayError::Forbidden(format!(
                "Customer sessions cannot send as {}",
                sender.as_wire()
            )));
        }
        Ok(())
    }

    /// Staff-only operations such as assignment
    pub fn require_staff(&self, role: SessionRole, action: &str) -> RelayResult<()> {
        if self.enforce && role != SessionRole::Staff {
            return Err(RelayError::Forbidden(format!("Only staff can {action}")));
        }
        Ok(())
    }
}
