//! Rule-based ("smart") group membership

pub mod evaluator;
pub mod rules;

pub use evaluator::{
    GroupMembersView, MembershipStrategy, SmartGroupEvaluator, SmartGroupMembership,
};
pub use rules::{RulePredicate, SmartGroupRules};
