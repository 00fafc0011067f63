use crate::server::modbus::SlaveContext;
use bmart_derive::EnumStr;
use eva_common::{EResult, Error};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rmodbus::server::context::ModbusContext;

pub const COILS: usize = 8;
pub const DISCRETES: usize = 8;
pub const INPUTS: usize = 16;
pub const HOLDINGS: usize = 16;

/// All registers are filled with this value on startup
pub const DEFAULT_VALUE: u16 = 17;

pub type StoreContext = ModbusContext<COILS, DISCRETES, INPUTS, HOLDINGS>;

pub type LockedStore = crate::LockedContext<Store>;

pub static STORE: Lazy<LockedStore> = Lazy::new(|| RwLock::new(Store::default()));

#[derive(Eq, PartialEq, Copy, Clone, Debug, EnumStr)]
#[enumstr(rename_all = "lowercase")]
pub enum Bank {
    Coil,
    Discrete,
    Input,
    Holding,
}

impl Bank {
    pub fn size(self) -> usize {
        match self {
            Bank::Coil => COILS,
            Bank::Discrete => DISCRETES,
            Bank::Input => INPUTS,
            Bank::Holding => HOLDINGS,
        }
    }
    /// Modbus function codes which address the bank
    pub fn function_codes(self) -> &'static [u8] {
        match self {
            Bank::Coil => &[1, 5, 15],
            Bank::Discrete => &[2],
            Bank::Input => &[4],
            Bank::Holding => &[3, 6, 16, 22, 23],
        }
    }
    #[inline]
    pub fn is_bit(self) -> bool {
        matches!(self, Bank::Coil | Bank::Discrete)
    }
}

/// Register store of the single served slave
///
/// Bit banks are exchanged as u16: 0 is false, anything else is true, reads return 0/1.
pub struct Store {
    modbus: StoreContext,
}

impl Default for Store {
    fn default() -> Self {
        Self::with_default(DEFAULT_VALUE)
    }
}

impl SlaveContext<COILS, DISCRETES, INPUTS, HOLDINGS> for Store {
    #[inline]
    fn modbus_context(&self) -> &StoreContext {
        &self.modbus
    }
    #[inline]
    fn modbus_context_mut(&mut self) -> &mut StoreContext {
        &mut self.modbus
    }
}

#[inline]
fn oob(bank: Bank, offset: u16, count: usize, e: rmodbus::ErrorKind) -> Error {
    Error::invalid_params(format!(
        "{} registers {}..{} not available ({} total): {}",
        bank,
        offset,
        usize::from(offset) + count,
        bank.size(),
        e
    ))
}

fn fill(modbus: &mut StoreContext, value: u16) -> Result<(), rmodbus::ErrorKind> {
    let bit = value != 0;
    modbus.set_coils_bulk(0, &[bit; COILS])?;
    modbus.set_discretes_bulk(0, &[bit; DISCRETES])?;
    modbus.set_inputs_bulk(0, &[value; INPUTS])?;
    modbus.set_holdings_bulk(0, &[value; HOLDINGS])?;
    Ok(())
}

impl Store {
    pub fn with_default(value: u16) -> Self {
        let mut modbus = StoreContext::default();
        let res = fill(&mut modbus, value);
        debug_assert!(res.is_ok(), "store fill failed: {:?}", res);
        Self { modbus }
    }

    pub fn read(&self, bank: Bank, offset: u16, count: u16) -> EResult<Vec<u16>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let c = usize::from(count);
        if bank.is_bit() {
            let mut bits = Vec::with_capacity(c);
            let res = if bank == Bank::Coil {
                self.modbus.get_coils_bulk(offset, count, &mut bits)
            } else {
                self.modbus.get_discretes_bulk(offset, count, &mut bits)
            };
            res.map_err(|e| oob(bank, offset, c, e))?;
            Ok(bits.into_iter().map(u16::from).collect())
        } else {
            let mut regs = Vec::with_capacity(c);
            let res = if bank == Bank::Input {
                self.modbus.get_inputs_bulk(offset, count, &mut regs)
            } else {
                self.modbus.get_holdings_bulk(offset, count, &mut regs)
            };
            res.map_err(|e| oob(bank, offset, c, e))?;
            Ok(regs)
        }
    }

    pub fn write(&mut self, bank: Bank, offset: u16, values: &[u16]) -> EResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        let res = match bank {
            Bank::Coil => {
                let bits: Vec<bool> = values.iter().map(|v| *v != 0).collect();
                self.modbus.set_coils_bulk(offset, &bits)
            }
            Bank::Discrete => {
                let bits: Vec<bool> = values.iter().map(|v| *v != 0).collect();
                self.modbus.set_discretes_bulk(offset, &bits)
            }
            Bank::Input => self.modbus.set_inputs_bulk(offset, values),
            Bank::Holding => self.modbus.set_holdings_bulk(offset, values),
        };
        res.map_err(|e| oob(bank, offset, values.len(), e))
    }
}

/// Reads a register block under the read lock
#[inline]
pub fn read(ctx: &LockedStore, bank: Bank, offset: u16, count: u16) -> EResult<Vec<u16>> {
    ctx.read().read(bank, offset, count)
}

/// Writes a register block under the write lock
#[inline]
pub fn write(ctx: &LockedStore, bank: Bank, offset: u16, values: &[u16]) -> EResult<()> {
    ctx.write().write(bank, offset, values)
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_defaults() {
        let store = Store::default();
        assert_eq!(store.read(Bank::Holding, 0, 16).unwrap(), vec![17; 16]);
        assert_eq!(store.read(Bank::Input, 0, 16).unwrap(), vec![17; 16]);
        assert_eq!(store.read(Bank::Coil, 0, 8).unwrap(), vec![1; 8]);
        assert_eq!(store.read(Bank::Discrete, 0, 8).unwrap(), vec![1; 8]);
        let store = Store::with_default(0);
        assert_eq!(store.read(Bank::Discrete, 0, 8).unwrap(), vec![0; 8]);
    }

    #[test]
    fn test_read_write() {
        let mut store = Store::default();
        store.write(Bank::Discrete, 0, &[1, 0]).unwrap();
        assert_eq!(store.read(Bank::Discrete, 0, 2).unwrap(), vec![1, 0]);
        assert_eq!(store.read(Bank::Discrete, 2, 6).unwrap(), vec![1; 6]);
        store.write(Bank::Coil, 7, &[0]).unwrap();
        assert_eq!(store.read(Bank::Coil, 6, 2).unwrap(), vec![1, 0]);
        store.write(Bank::Holding, 14, &[0xAABB, 0xCCDD]).unwrap();
        assert_eq!(
            store.read(Bank::Holding, 13, 3).unwrap(),
            vec![17, 0xAABB, 0xCCDD]
        );
        store.write(Bank::Input, 0, &[99]).unwrap();
        assert_eq!(store.read(Bank::Input, 0, 2).unwrap(), vec![99, 17]);
        // non-zero values set bits
        store.write(Bank::Coil, 0, &[5]).unwrap();
        assert_eq!(store.read(Bank::Coil, 0, 1).unwrap(), vec![1]);
        assert!(store.read(Bank::Coil, 0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_oob() {
        let mut store = Store::default();
        assert!(store.read(Bank::Discrete, 0, 9).is_err());
        assert!(store.read(Bank::Discrete, 8, 1).is_err());
        assert!(store.read(Bank::Holding, 15, 2).is_err());
        assert!(store.read(Bank::Input, 16, 1).is_err());
        assert!(store.write(Bank::Holding, 15, &[1, 2]).is_err());
        assert!(store.write(Bank::Coil, 7, &[0, 0]).is_err());
        assert_eq!(store.read(Bank::Holding, 15, 1).unwrap(), vec![17]);
        assert_eq!(store.read(Bank::Coil, 7, 1).unwrap(), vec![1]);
    }

    #[test]
    fn test_locked() {
        let ctx: LockedStore = RwLock::new(Store::default());
        write(&ctx, Bank::Discrete, 0, &[0, 1]).unwrap();
        assert_eq!(read(&ctx, Bank::Discrete, 0, 2).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_bank() {
        assert_eq!(Bank::Discrete.to_string(), "discrete");
        assert_eq!(Bank::Holding.function_codes(), &[3, 6, 16, 22, 23]);
        assert_eq!(Bank::Input.size(), 16);
    }
}
