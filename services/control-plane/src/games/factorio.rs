use std::collections::BTreeMap;

use hearth_model::{
    Deployment, EnvironmentVariable, Gameserver, GameserverDefinition, NetworkPort,
    ResourceRequirements, RunningInstance,
};

use super::{
    primary_endpoint, validate_definition, GameAdapter, GameError, GameMetadata, GameOption,
};

const VERSIONS: &[&str] = &["0.16.51", "0.17.63"];
const GAME_PORT: NetworkPort = NetworkPort::udp(34197);
const MAX_VALUE_LEN: usize = 256;

/// Each parameter becomes a `CONFIG_<NAME>` variable read by the image.
pub struct FactorioAdapter;

impl GameAdapter for FactorioAdapter {
    fn name(&self) -> &'static str {
        "Factorio"
    }

    fn metadata(&self) -> GameMetadata {
        GameMetadata {
            name: self.name().to_string(),
            options: VERSIONS
                .iter()
                .map(|v| GameOption {
                    version: v.to_string(),
                    parameters: BTreeMap::from([(
                        "description".to_string(),
                        "Description of the server".to_string(),
                    )]),
                })
                .collect(),
        }
    }

    fn create_deployment(
        &self,
        definition: &GameserverDefinition,
    ) -> Result<Deployment, GameError> {
        validate_definition(&self.metadata(), definition, MAX_VALUE_LEN)?;

        let env = definition
            .parameters
            .iter()
            .map(|(k, v)| EnvironmentVariable::new(format!("CONFIG_{}", k.to_uppercase()), v))
            .collect();

        Ok(Deployment {
            uuid: definition.uuid,
            image: format!("factoriotools/factorio:{}", definition.version),
            env,
            ports: vec![GAME_PORT],
            resources: ResourceRequirements::from_mib(1024, 512),
            agent: String::new(),
        })
    }

    fn endpoint(
        &self,
        gameserver: &Gameserver,
        instance: Option<&RunningInstance>,
    ) -> Result<String, GameError> {
        primary_endpoint(gameserver, instance, GAME_PORT)
    }
}
