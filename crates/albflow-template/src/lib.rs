//! albflow template assembly
//!
//! This crate turns a set of Lambda compute targets and decorators into a
//! single CloudFormation template, and drives the template through a
//! provisioning platform.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  albflow CLI                     │
//! │        (template / provision / delete)           │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               albflow-template                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  Deployment::assemble                     │   │
//! │  │  targets -> decorators -> resolve -> JSON │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │    Driver    │  │  State Mgmt  │            │
//! │  └──────┬───────┘  └──────────────┘            │
//! └─────────┼───────────────────────────────────────┘
//!           │ trait Provisioner
//! ┌─────────▼─────────┐
//! │    albflow-aws    │
//! │  (CloudFormation) │
//! └───────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use albflow_template::{
//!     ApplicationLoadBalancerDecorator, CodeLocation, ComputeTarget, Deployment,
//!     LoadBalancerSpec, RouteCondition,
//! };
//!
//! let code = CodeLocation::s3("artifacts", "hello.zip");
//! let spec = LoadBalancerSpec::new("ALB", ["subnet-a", "subnet-b"]);
//! let mut alb = ApplicationLoadBalancerDecorator::new(spec, 80, "HTTP", "Hello").unwrap();
//! alb.add_conditional_route(RouteCondition::path("/newhello*"), "NewHello");
//!
//! let mut deployment = Deployment::new("MyALBStack");
//! deployment
//!     .add_target(ComputeTarget::new("Hello", code.clone()))
//!     .add_target(ComputeTarget::new("NewHello", code))
//!     .add_decorator(alb);
//!
//! let template = deployment.assemble().unwrap();
//!
//! assert_eq!(template.routes().len(), 2);
//! ```

pub mod alb;
pub mod assembler;
pub mod compute;
pub mod decorator;
pub mod driver;
pub mod error;
pub mod graph;
pub mod naming;
pub mod provisioner;
pub mod resolver;
pub mod resource;
pub mod routing;
pub mod state;
pub mod template;

// Re-exports
pub use alb::{ApplicationLoadBalancerDecorator, ListenerProtocol, LoadBalancerSpec};
pub use assembler::Deployment;
pub use compute::{CodeLocation, ComputeTarget};
pub use decorator::{Decoration, Decorator, ResourceDecorator, TemplateOutput};
pub use driver::{DeploymentPhase, DeploymentRecord, PhaseTransition, deploy};
pub use error::{Result, StackError};
pub use graph::ResourceGraph;
pub use naming::{AccountScope, logical_name, scoped_stack_name};
pub use provisioner::{
    AuthStatus, PollConfig, Provisioner, StackDescription, StackEvent, StackOperation,
    SubmissionOutcome,
};
pub use resolver::{Resolution, resolve};
pub use resource::{PropertyValue, Reference, ResourceDescriptor};
pub use routing::{RouteCondition, RouteRequest, RouteTable, RoutingEntry};
pub use state::{LockPurpose, StateLock, StateManager};
pub use template::Template;
