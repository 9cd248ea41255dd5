//! Vehicle command names and the parameter checks the server expects
//! before a signed command is submitted.

use serde_json::{Map, Value};

use crate::CommandError;

macro_rules! vehicle_commands {
    ($($variant:ident => $name:literal,)*) => {
        /// Commands the vehicle accepts through `sendVehicleCommand`
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum VehicleCommand {
            $($variant,)*
        }

        impl VehicleCommand {
            pub const ALL: &'static [VehicleCommand] = &[$(VehicleCommand::$variant,)*];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(VehicleCommand::$variant => $name,)*
                }
            }
        }
    };
}

vehicle_commands! {
    WakeVehicle => "WAKE_VEHICLE",
    UnlockUserPreferencesAndDisableAlarm => "UNLOCK_USER_PREFERENCES_AND_DISABLE_ALARM",
    HonkAndFlashLights => "HONK_AND_FLASH_LIGHTS",
    ActivateExternalSound => "ACTIVATE_EXTERNAL_SOUND",
    FlashExternalLights => "FLASH_EXTERNAL_LIGHTS",
    // charging
    ChargingLimits => "CHARGING_LIMITS",
    StartCharging => "START_CHARGING",
    StopCharging => "STOP_CHARGING",
    // climate
    CabinHvacDefrostDefog => "CABIN_HVAC_DEFROST_DEFOG",
    CabinHvacLeftSeatHeat => "CABIN_HVAC_LEFT_SEAT_HEAT",
    CabinHvacLeftSeatVent => "CABIN_HVAC_LEFT_SEAT_VENT",
    CabinHvacRearLeftSeatHeat => "CABIN_HVAC_REAR_LEFT_SEAT_HEAT",
    CabinHvacRearRightSeatHeat => "CABIN_HVAC_REAR_RIGHT_SEAT_HEAT",
    CabinHvacRightSeatHeat => "CABIN_HVAC_RIGHT_SEAT_HEAT",
    CabinHvacRightSeatVent => "CABIN_HVAC_RIGHT_SEAT_VENT",
    CabinHvacSteeringHeat => "CABIN_HVAC_STEERING_HEAT",
    CabinPreconditioningSetTemp => "CABIN_PRECONDITIONING_SET_TEMP",
    ClimateHoldOff => "CLIMATE_HOLD_OFF",
    ClimateHoldOn => "CLIMATE_HOLD_ON",
    VehicleCabinPreconditionDisable => "VEHICLE_CABIN_PRECONDITION_DISABLE",
    VehicleCabinPreconditionEnable => "VEHICLE_CABIN_PRECONDITION_ENABLE",
    CabinHvacThirdRowLeftSeatHeat => "CABIN_HVAC_THIRD_ROW_LEFT_SEAT_HEAT",
    CabinHvacThirdRowRightSeatHeat => "CABIN_HVAC_THIRD_ROW_RIGHT_SEAT_HEAT",
    // closures
    LockAllClosuresFeedback => "LOCK_ALL_CLOSURES_FEEDBACK",
    UnlockAllClosures => "UNLOCK_ALL_CLOSURES",
    UnlockDriverDoor => "UNLOCK_DRIVER_DOOR",
    UnlockPassengerDoor => "UNLOCK_PASSENGER_DOOR",
    CloseFrunk => "CLOSE_FRUNK",
    OpenFrunk => "OPEN_FRUNK",
    EnableGearGuard => "ENABLE_GEAR_GUARD",
    EnableGearGuardVideo => "ENABLE_GEAR_GUARD_VIDEO",
    DisableGearGuard => "DISABLE_GEAR_GUARD",
    DisableGearGuardVideo => "DISABLE_GEAR_GUARD_VIDEO",
    CloseLiftgate => "CLOSE_LIFTGATE",
    OpenLiftgateUnlatchTailgate => "OPEN_LIFTGATE_UNLATCH_TAILGATE",
    OpenChargePortDoor => "OPEN_CHARGE_PORT_DOOR",
    CloseChargePortDoor => "CLOSE_CHARGE_PORT_DOOR",
    OtaInstallNowAcknowledge => "OTA_INSTALL_NOW_ACKNOWLEDGE",
    PanicOff => "PANIC_OFF",
    PanicOn => "PANIC_ON",
    ReleaseLeftSideBin => "RELEASE_LEFT_SIDE_BIN",
    ReleaseRightSideBin => "RELEASE_RIGHT_SIDE_BIN",
    CloseTonneauCover => "CLOSE_TONNEAU_COVER",
    OpenTonneauCover => "OPEN_TONNEAU_COVER",
    CloseAllWindows => "CLOSE_ALL_WINDOWS",
    OpenAllWindows => "OPEN_ALL_WINDOWS",
    UnlockAllAndOpenWindows => "UNLOCK_ALL_AND_OPEN_WINDOWS",
}

impl std::fmt::Display for VehicleCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown vehicle command: {0}")]
pub struct UnknownCommand(pub String);

impl std::str::FromStr for VehicleCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VehicleCommand::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

const HVAC_LEVEL_COMMANDS: &[VehicleCommand] = &[
    VehicleCommand::CabinHvacDefrostDefog,
    VehicleCommand::CabinHvacLeftSeatHeat,
    VehicleCommand::CabinHvacLeftSeatVent,
    VehicleCommand::CabinHvacRearLeftSeatHeat,
    VehicleCommand::CabinHvacRearRightSeatHeat,
    VehicleCommand::CabinHvacRightSeatHeat,
    VehicleCommand::CabinHvacRightSeatVent,
    VehicleCommand::CabinHvacSteeringHeat,
];

/// Check `params` for commands that require them, normalising values
/// into the form the server accepts. Commands outside the catalogue and
/// commands without parameter rules pass through untouched.
pub fn validate_params(command: &str, params: Option<&mut Map<String, Value>>) -> Result<(), CommandError> {
    let Ok(command) = command.parse::<VehicleCommand>() else {
        return Ok(());
    };

    if command == VehicleCommand::ChargingLimits {
        let limit = params.as_deref().and_then(|p| p.get("SOC_limit")).and_then(Value::as_i64);
        if !matches!(limit, Some(50..=100)) {
            return Err(CommandError::ChargingLimit);
        }
    } else if HVAC_LEVEL_COMMANDS.contains(&command) {
        let level = params.as_deref().and_then(|p| p.get("level")).and_then(Value::as_i64);
        if !matches!(level, Some(0..=4)) {
            return Err(CommandError::HvacLevel);
        }
    } else if command == VehicleCommand::CabinPreconditioningSetTemp {
        let Some(params) = params else {
            return Err(CommandError::HvacTemperature);
        };
        let normalised = match params.get("HVAC_set_temp") {
            Some(Value::Number(temp)) => temp
                .as_f64()
                .filter(|t| (16.0..=29.0).contains(t) || *t == 0.0 || *t == 63.5)
                .map(|_| temp.to_string()),
            _ => None,
        };
        let temp = normalised.ok_or(CommandError::HvacTemperature)?;
        params.insert("HVAC_set_temp".to_string(), Value::String(temp));
    }

    Ok(())
}
