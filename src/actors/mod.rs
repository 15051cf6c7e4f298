mod refresh_actor;
#[cfg(test)]
mod tests;

pub use refresh_actor::RefreshActor;
