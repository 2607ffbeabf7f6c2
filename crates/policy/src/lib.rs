//! Policy slots and the ordered, short-circuiting policy chain.

pub mod chain;
pub mod commit;
pub mod slot;

pub use chain::PolicyChain;
pub use commit::{CommitError, CommitHandle};
pub use slot::{allow, deny, policy_fn, AllowAll, FnPolicy, PolicyArgs, PolicyFn, PolicySlot};
