//! 挂号状态机
//!
//! 管理挂号记录的分诊状态转换，只允许向前流转

use clinic_core::{ClinicError, RegistrationStatus, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RegistrationEvent {
    Start,  // 开始检查
    Finish, // 检查完成
}

/// 挂号状态机
#[derive(Debug)]
pub struct RegistrationStateMachine {
    transitions: HashMap<(RegistrationStatus, RegistrationEvent), RegistrationStatus>,
}

impl RegistrationStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 定义状态转换规则
        transitions.insert((RegistrationStatus::Pending, RegistrationEvent::Start), RegistrationStatus::Running);
        transitions.insert((RegistrationStatus::Pending, RegistrationEvent::Finish), RegistrationStatus::Complete);
        transitions.insert((RegistrationStatus::Running, RegistrationEvent::Finish), RegistrationStatus::Complete);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: RegistrationStatus, event: RegistrationEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: RegistrationStatus, event: RegistrationEvent) -> Result<RegistrationStatus> {
        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(ClinicError::InvalidStateTransition {
                from: from.to_string(),
                to: format!("{:?}", event),
            }),
        }
    }

    /// 目标状态对应的事件；Pending 没有入口事件
    pub fn event_for_target(target: RegistrationStatus) -> Option<RegistrationEvent> {
        match target {
            RegistrationStatus::Pending => None,
            RegistrationStatus::Running => Some(RegistrationEvent::Start),
            RegistrationStatus::Complete => Some(RegistrationEvent::Finish),
        }
    }

    /// 按目标状态执行转换
    pub fn transition_to(&self, from: RegistrationStatus, to: RegistrationStatus) -> Result<RegistrationStatus> {
        let invalid = || ClinicError::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        };

        let event = Self::event_for_target(to).ok_or_else(invalid)?;
        self.transition(from, event).map_err(|_| invalid())
    }

    /// 当前状态下可到达的目标状态，按流转顺序排列
    pub fn available_targets(&self, current: RegistrationStatus) -> Vec<RegistrationStatus> {
        let mut targets: Vec<RegistrationStatus> = self
            .transitions
            .iter()
            .filter(|((state, _), _)| *state == current)
            .map(|(_, to)| *to)
            .collect();
        targets.sort();
        targets.dedup();
        targets
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current: RegistrationStatus) -> Vec<RegistrationEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for RegistrationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let sm = RegistrationStateMachine::new();

        assert!(sm.can_transition(RegistrationStatus::Pending, RegistrationEvent::Start));
        assert!(sm.can_transition(RegistrationStatus::Pending, RegistrationEvent::Finish));
        assert!(sm.can_transition(RegistrationStatus::Running, RegistrationEvent::Finish));
    }

    #[test]
    fn test_invalid_transitions() {
        let sm = RegistrationStateMachine::new();

        assert!(!sm.can_transition(RegistrationStatus::Running, RegistrationEvent::Start));
        assert!(!sm.can_transition(RegistrationStatus::Complete, RegistrationEvent::Start));
        assert!(!sm.can_transition(RegistrationStatus::Complete, RegistrationEvent::Finish));
    }

    #[test]
    fn test_backward_targets_rejected() {
        let sm = RegistrationStateMachine::new();

        assert!(sm.transition_to(RegistrationStatus::Complete, RegistrationStatus::Pending).is_err());
        assert!(sm.transition_to(RegistrationStatus::Complete, RegistrationStatus::Running).is_err());
        assert!(sm.transition_to(RegistrationStatus::Running, RegistrationStatus::Pending).is_err());
        assert_eq!(
            sm.transition_to(RegistrationStatus::Pending, RegistrationStatus::Complete).unwrap(),
            RegistrationStatus::Complete
        );
    }

    #[test]
    fn test_available_targets() {
        let sm = RegistrationStateMachine::new();

        assert_eq!(
            sm.available_targets(RegistrationStatus::Pending),
            vec![RegistrationStatus::Running, RegistrationStatus::Complete]
        );
        assert_eq!(sm.available_targets(RegistrationStatus::Running), vec![RegistrationStatus::Complete]);
        assert!(sm.available_targets(RegistrationStatus::Complete).is_empty());
        assert!(sm.get_possible_events(RegistrationStatus::Complete).is_empty());
    }
}
