//! UI-agnostic pieces of message presentation: agent badges, relative
//! timestamps and escalation notices.

use chrono::{DateTime, Local};

use crate::models::AgentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentBadge {
    pub icon: &'static str,
    pub label: &'static str,
}

const CUSTOMER_SERVICE: AgentBadge = AgentBadge {
    icon: "💬",
    label: "Customer Service",
};

/// Badge for an agent. Missing or unrecognized agents get the customer
/// service badge.
pub fn agent_badge(agent_type: Option<AgentType>) -> AgentBadge {
    match agent_type {
        Some(AgentType::Orchestrator) => AgentBadge {
            icon: "🧭",
            label: "Orchestrator",
        },
        Some(AgentType::Sales) => AgentBadge {
            icon: "🛒",
            label: "Sales",
        },
        Some(AgentType::Marketing) => AgentBadge {
            icon: "📣",
            label: "Marketing",
        },
        Some(AgentType::TechnicalSupport) => AgentBadge {
            icon: "🔧",
            label: "Technical Support",
        },
        Some(AgentType::OrderLogistics) => AgentBadge {
            icon: "📦",
            label: "Orders & Logistics",
        },
        Some(AgentType::CustomerService) | Some(AgentType::Unknown) | None => CUSTOMER_SERVICE,
    }
}

/// "just now", "5m ago", "3h ago", "2d ago", then the calendar date.
pub fn relative_time(timestamp: DateTime<Local>, now: DateTime<Local>) -> String {
    let elapsed = now.signed_duration_since(timestamp);
    let seconds = elapsed.num_seconds();

    if seconds < 60 {
        "just now".to_string()
    } else if seconds < 3_600 {
        format!("{}m ago", elapsed.num_minutes())
    } else if seconds < 86_400 {
        format!("{}h ago", elapsed.num_hours())
    } else if seconds < 7 * 86_400 {
        format!("{}d ago", elapsed.num_days())
    } else {
        timestamp.format("%b %d").to_string()
    }
}

/// The ticket id from an escalation notice such as
/// "...escalated to our human support team (Ticket #TKT-1A2B3C4D)...".
pub fn escalation_ticket(content: &str) -> Option<&str> {
    const MARKER: &str = "(Ticket #";
    let start = content.find(MARKER)? + MARKER.len();
    let rest = &content[start..];
    let id = &rest[..rest.find(')')?];
    (!id.is_empty()).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_known_agents_have_distinct_badges() {
        let sales = agent_badge(Some(AgentType::Sales));
        let support = agent_badge(Some(AgentType::TechnicalSupport));
        assert_eq!(sales.label, "Sales");
        assert_ne!(sales.icon, support.icon);
    }

    #[test]
    fn test_missing_or_unknown_agent_defaults_to_customer_service() {
        assert_eq!(agent_badge(None), CUSTOMER_SERVICE);
        assert_eq!(agent_badge(Some(AgentType::Unknown)), CUSTOMER_SERVICE);
        assert_eq!(agent_badge(Some(AgentType::CustomerService)).label, "Customer Service");
    }

    #[test]
    fn test_relative_time_buckets() {
        let now = Local.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();

        assert_eq!(relative_time(now - Duration::seconds(20), now), "just now");
        assert_eq!(relative_time(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3h ago");
        assert_eq!(relative_time(now - Duration::days(2), now), "2d ago");
        assert_eq!(relative_time(now - Duration::days(30), now), "Feb 08");
    }

    #[test]
    fn test_escalation_ticket() {
        let reply = "I understand.\n\n⚠️ Your case has been escalated to our human support team \
                     (Ticket #TKT-1A2B3C4D). A representative will assist you shortly. ";
        assert_eq!(escalation_ticket(reply), Some("TKT-1A2B3C4D"));
        assert_eq!(escalation_ticket("Your order shipped."), None);
        assert_eq!(escalation_ticket("(Ticket #) broken"), None);
        assert_eq!(escalation_ticket("(Ticket #TKT-unterminated"), None);
    }

    #[test]
    fn test_future_timestamps_read_as_just_now() {
        let now = Local::now();
        assert_eq!(relative_time(now + Duration::minutes(2), now), "just now");
    }
}
