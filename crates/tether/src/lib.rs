#![forbid(unsafe_code)]

//! Tether: an MVVM data-binding engine.
//!
//! The workspace splits into four layers, re-exported here as modules:
//!
//! - [`core`]: the [`Value`](core::Value) model, [`DynObject`](core::DynObject)
//!   object graphs, member descriptors/providers, change notification, and
//!   the scheduler seam.
//! - [`expr`]: the binding-expression front end. Text parses to a structural
//!   [`Expr`](expr::Expr) tree that compiles to an invocable evaluator or
//!   yields the member chains it observes.
//! - [`observe`]: [`PathObserver`](observe::PathObserver), a live
//!   subscription chain along a dotted member path that survives
//!   intermediate repointing.
//! - [`binding`]: the synchronization state machine tying a source and a
//!   target endpoint together through an interceptor pipeline.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//!
//! use tether::binding::BindingBuilder;
//! use tether::core::{EngineContext, Value, ViewModel};
//!
//! let context = Arc::new(EngineContext::default());
//!
//! let model = ViewModel::new("Model");
//! model.seed("Name", "ada");
//! let view = ViewModel::new("View");
//! view.seed("Text", "");
//!
//! let binding = BindingBuilder::new(context)
//!     .source_path(model.clone(), "Name")
//!     .target_path(view.clone(), "Text")
//!     .build()
//!     .unwrap();
//!
//! use tether::core::DynObject;
//! assert_eq!(view.get_member("Text"), Some(Value::from("ada")));
//! binding.dispose();
//! ```

pub use tether_binding as binding;
pub use tether_core as core;
pub use tether_expr as expr;
pub use tether_observe as observe;
