#![no_main]
use ciborium::de::from_reader;
use fngate_core::{Escrow, EventLog, FunctionGateway, FunctionRegistry, GatewaySnapshot};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(snap) = from_reader::<GatewaySnapshot, _>(data) {
        let restored: Result<FunctionGateway, _> = FunctionGateway::restore(
            snap,
            FunctionRegistry::new(),
            Escrow::new(),
            EventLog::new(),
        );
        if let Ok(gw) = restored {
            let _ = gw.snapshot();
        }
    }
});
