// Engine modules: physics bridge and the runtime it steps on

pub mod physics;
pub mod runtime;
