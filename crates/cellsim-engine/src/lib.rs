//! Cell graphs for the cellsim engine.
//!
//! Cells placed by a host [`CellContainer`] are connected to accepting
//! neighbours and grouped into [`CellGraph`]s, the maximal connected sets.
//! Each graph realizes one solver per connected subset of every domain and
//! ticks on its own fixed-rate task of the shared scheduler. The
//! [`CellGraphManager`] owns every graph and keeps membership equal to the
//! connection closure as cells come and go.
//!
//! Topology changes run on the manager's control thread while the affected
//! graphs are stopped; tick threads hand work back through the control
//! queue.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod behavior;
pub mod behaviors;
pub mod cell;
pub mod config;
pub mod connections;
pub mod container;
pub mod context;
pub mod error;
pub mod graph;
pub mod manager;
pub mod metrics;
pub mod object;
pub mod objects;
pub mod persistence;
pub mod registry;
pub mod scheduler;
pub mod solvers;
pub mod subscriber;

pub use behavior::{CellBehavior, CellBehaviorContainer};
pub use behaviors::{
    PowerHeatingBehavior, TemperatureExplosionBehavior, TemperatureReplicatorBehavior,
    TemperatureUpdate, VoltageSetpointBehavior,
};
pub use cell::{Cell, CellBuilder, CellHooks, CellInfo, NoHooks, WorldLoadStage};
pub use config::{ConfigError, SimulationConfig};
pub use container::{
    face_scan, planar_scan, wrapped_scan, CellContainer, ContainerLookup, NeighborInfo,
};
pub use context::TickContext;
pub use error::{CellError, PersistenceError};
pub use graph::{CellGraph, TickStage};
pub use manager::{CellGraphManager, ControlTask};
pub use metrics::TickMetrics;
pub use object::{
    DiffusionModel, ElectricalModel, ObjectModel, ObjectPeer, SimulationObject,
    SimulationObjectSet, ThermalModel,
};
pub use persistence::{
    BehaviorRecord, CellPayload, CellRecord, DomainPartition, GraphRecord, ManagerRecord,
    ObjectRecord,
};
pub use registry::{CellProvider, CellRegistry};
pub use scheduler::{Job, SchedulerHandle, SimulationScheduler, TaskHandle};
pub use solvers::{BuildReport, Realized, Solvers, StatusChange, SubsetReport};
pub use subscriber::{
    Subscriber, SubscriberCollection, SubscriberCollectionExt, SubscriberOptions,
    SubscriberPhase, SubscriberPool, TrackedCollection, TrackedSubscribers,
};
