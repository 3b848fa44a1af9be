//! Engine construction from a session.

use hotmic_core::{AudioProcessor, Engine, GraphError, PluginRegistry};

use crate::error::ConfigError;
use crate::session::SessionConfig;
use crate::validation::validate_session;

/// Validate `session` and build a running engine from it.
///
/// Channels are restored in order with their strip settings, the analysis
/// tap is selected and the routing order is rebuilt, so the returned
/// processor is ready for its first callback.
///
/// # Errors
///
/// [`ConfigError::Validation`] before anything is built, or
/// [`ConfigError::Engine`] if the engine rejects a channel.
pub fn build_engine(
    session: &SessionConfig,
    registry: &PluginRegistry,
) -> Result<(Engine, AudioProcessor), ConfigError> {
    if let Err(e) = validate_session(session, registry) {
        tracing::warn!(session = %session.name, error = %e, "session rejected");
        return Err(e.into());
    }

    let settings = session.engine_settings();
    let (mut engine, processor) = Engine::new(settings);
    for channel in &session.channels {
        engine
            .restore_channel(channel, registry)
            .map_err(|e| match e {
                GraphError::UnknownPlugin(id) => ConfigError::UnknownPlugin(id),
                other => ConfigError::Engine(other),
            })?;
    }
    engine.set_analysis_tap(session.routing)?;
    engine.maintain();

    tracing::info!(
        session = %session.name,
        channels = engine.channel_count(),
        sample_rate = settings.sample_rate,
        block_size = settings.block_size,
        quality = session.quality.name(),
        "engine built"
    );
    Ok((engine, processor))
}

/// Restart a running engine with the session's sample rate and block size.
///
/// Used after the quality mode or sample rate changed. The chains and the
/// analysis sink carry over; callers rebind to the returned handles.
pub fn reinitialize_engine(
    session: &SessionConfig,
    engine: Engine,
    processor: AudioProcessor,
) -> (Engine, AudioProcessor) {
    let settings = session.engine_settings();
    tracing::info!(
        session = %session.name,
        sample_rate = settings.sample_rate,
        block_size = settings.block_size,
        quality = session.quality.name(),
        "engine restarting"
    );
    engine.reinitialize(processor, settings)
}
