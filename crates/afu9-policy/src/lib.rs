// crates/afu9-policy/src/lib.rs
// ============================================================================
// Module: AFU-9 Policy Library
// Description: Repo access policy, lawbook resolution, and automation gating.
// Purpose: Expose the governance layer every gating write path consults.
// Dependencies: crate::{approval, evaluator, lawbook, repo_access, resolver}
// ============================================================================

//! ## Overview
//! The policy crate holds the three admissibility layers: the repo access
//! allowlist wrapping every Forge call, the cached lawbook resolver, and the
//! deterministic automation policy evaluator with its audit trail. All three
//! fail closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod approval;
pub mod evaluator;
pub mod lawbook;
pub mod repo_access;
pub mod resolver;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use approval::ApprovalDecision;
pub use approval::ApprovalError;
pub use approval::ApprovalGate;
pub use approval::ApprovalStore;
pub use approval::InMemoryApprovalStore;
pub use approval::has_approval;
pub use evaluator::AutomationPolicyEvaluator;
pub use evaluator::EvaluationOutcome;
pub use evaluator::EvaluationRequest;
pub use evaluator::ExecutionProbe;
pub use evaluator::InMemoryPolicyExecutionStore;
pub use evaluator::PolicyDecision;
pub use evaluator::PolicyExecutionRecord;
pub use evaluator::PolicyExecutionStore;
pub use evaluator::PolicyStoreError;
pub use evaluator::action_fingerprint;
pub use lawbook::AutomationPolicy;
pub use lawbook::InMemoryLawbookStore;
pub use lawbook::Lawbook;
pub use lawbook::LawbookError;
pub use lawbook::LawbookStore;
pub use repo_access::AccessDecision;
pub use repo_access::RepoAccessError;
pub use repo_access::RepoAccessPolicy;
pub use resolver::LawbookResolver;
pub use resolver::ResolverError;
pub use resolver::attach_lawbook_version;
