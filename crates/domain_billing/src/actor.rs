//! Who is acting, and what they may do
//!
//! Capabilities are checked against the real caller. A client paying through
//! the gateway is authorized by `can_pay_via_gateway`, never by borrowing a
//! finance role, so the audit trail always names the actual payer.

use std::fmt;

use serde::{Deserialize, Serialize};

use core_kernel::ClientId;

/// Roles recognised by the billing core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Highest administrative role; the only one allowed to reverse payments
    Admin,
    FinanceManager,
    FinanceExecutive,
    /// Read-only operations staff
    Operations,
    /// A client user, linked to exactly one client
    Client,
}

/// The caller of a billing operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable user identifier (recorded in the audit trail)
    pub user_id: String,
    pub role: Role,
    /// Linked client, for client users
    pub client_id: Option<ClientId>,
}

impl Actor {
    /// Creates an internal staff actor
    pub fn staff(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            client_id: None,
        }
    }

    /// Creates a client user linked to `client_id`
    pub fn client(user_id: impl Into<String>, client_id: ClientId) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Client,
            client_id: Some(client_id),
        }
    }

    /// Returns true for finance staff (admin, manager, executive)
    pub fn is_internal_finance(&self) -> bool {
        matches!(
            self.role,
            Role::Admin | Role::FinanceManager | Role::FinanceExecutive
        )
    }

    /// May record a payment in any mode
    pub fn can_record_payment(&self) -> bool {
        self.is_internal_finance()
    }

    /// May pay through the gateway channel on behalf of its own client
    pub fn can_pay_via_gateway(&self) -> bool {
        self.role == Role::Client && self.client_id.is_some()
    }

    /// May reverse a successful collection
    pub fn can_reverse_payment(&self) -> bool {
        self.role == Role::Admin
    }

    /// May draft, finalize, send, dispute and void invoices
    pub fn can_manage_invoices(&self) -> bool {
        self.is_internal_finance()
    }

    /// May raise a dispute: finance staff, or the invoice's own client
    pub fn can_raise_dispute(&self, client_id: ClientId) -> bool {
        self.is_internal_finance() || self.owns(client_id)
    }

    /// May create, submit and apply credit/debit notes
    pub fn can_create_notes(&self) -> bool {
        self.is_internal_finance()
    }

    /// May approve or reject notes
    pub fn can_approve_notes(&self) -> bool {
        matches!(self.role, Role::Admin | Role::FinanceManager)
    }

    /// May read ledger data belonging to `client_id`
    pub fn can_view_client(&self, client_id: ClientId) -> bool {
        match self.role {
            Role::Client => self.owns(client_id),
            _ => true,
        }
    }

    /// Returns true if this is a client user linked to `client_id`
    pub fn owns(&self, client_id: ClientId) -> bool {
        self.role == Role::Client && self.client_id == Some(client_id)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.user_id, self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_admin_reverses() {
        assert!(Actor::staff("a", Role::Admin).can_reverse_payment());
        assert!(!Actor::staff("m", Role::FinanceManager).can_reverse_payment());
        assert!(!Actor::client("c", ClientId::new()).can_reverse_payment());
    }

    #[test]
    fn test_client_capabilities() {
        let client_id = ClientId::new();
        let actor = Actor::client("shop-owner", client_id);

        assert!(actor.can_pay_via_gateway());
        assert!(!actor.can_record_payment());
        assert!(!actor.can_create_notes());
        assert!(actor.can_view_client(client_id));
        assert!(!actor.can_view_client(ClientId::new()));
        assert!(actor.can_raise_dispute(client_id));
    }

    #[test]
    fn test_staff_cannot_use_gateway_channel() {
        let actor = Actor::staff("fin", Role::FinanceExecutive);
        assert!(!actor.can_pay_via_gateway());
        assert!(actor.can_record_payment());
        assert!(!actor.can_approve_notes());
    }

    #[test]
    fn test_operations_is_read_only() {
        let actor = Actor::staff("ops", Role::Operations);
        assert!(!actor.can_record_payment());
        assert!(!actor.can_manage_invoices());
        assert!(!actor.can_create_notes());
        assert!(actor.can_view_client(ClientId::new()));
    }
}
