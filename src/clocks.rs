use crate::error::{BringupError, ClockDomain, ClockStage};
use crate::hw::{BusDomain, ClockControl, OscillatorKind, SysclkSource};
use crate::Hertz;


// - constants ----------------------------------------------------------------

/// Internal RC oscillator
pub const HSI: Hertz = Hertz::MHz(8);

pub const HSE_MIN: Hertz = Hertz::MHz(4);
pub const HSE_MAX: Hertz = Hertz::MHz(16);
pub const PLL_INPUT_MIN: Hertz = Hertz::MHz(1);
pub const PLL_INPUT_MAX: Hertz = Hertz::MHz(25);
pub const PLL_OUTPUT_MIN: Hertz = Hertz::MHz(16);
pub const PLL_OUTPUT_MAX: Hertz = Hertz::MHz(72);
pub const SYSCLK_MAX: Hertz = Hertz::MHz(72);
pub const HCLK_MAX: Hertz = Hertz::MHz(72);
pub const PCLK1_MAX: Hertz = Hertz::MHz(36);
pub const PCLK2_MAX: Hertz = Hertz::MHz(72);


// - types --------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AhbPrescaler {
    Div1,
    Div2,
    Div4,
    Div8,
    Div16,
    Div64,
    Div128,
    Div256,
    Div512,
}

impl AhbPrescaler {
    pub const fn divisor(self) -> u32 {
        match self {
            AhbPrescaler::Div1 => 1,
            AhbPrescaler::Div2 => 2,
            AhbPrescaler::Div4 => 4,
            AhbPrescaler::Div8 => 8,
            AhbPrescaler::Div16 => 16,
            AhbPrescaler::Div64 => 64,
            AhbPrescaler::Div128 => 128,
            AhbPrescaler::Div256 => 256,
            AhbPrescaler::Div512 => 512,
        }
    }

    /// RCC_CFGR.HPRE
    pub const fn bits(self) -> u32 {
        match self {
            AhbPrescaler::Div1 => 0b0000,
            AhbPrescaler::Div2 => 0b1000,
            AhbPrescaler::Div4 => 0b1001,
            AhbPrescaler::Div8 => 0b1010,
            AhbPrescaler::Div16 => 0b1011,
            AhbPrescaler::Div64 => 0b1100,
            AhbPrescaler::Div128 => 0b1101,
            AhbPrescaler::Div256 => 0b1110,
            AhbPrescaler::Div512 => 0b1111,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApbPrescaler {
    Div1,
    Div2,
    Div4,
    Div8,
    Div16,
}

impl ApbPrescaler {
    pub const fn divisor(self) -> u32 {
        match self {
            ApbPrescaler::Div1 => 1,
            ApbPrescaler::Div2 => 2,
            ApbPrescaler::Div4 => 4,
            ApbPrescaler::Div8 => 8,
            ApbPrescaler::Div16 => 16,
        }
    }

    /// RCC_CFGR.PPRE1 / PPRE2
    pub const fn bits(self) -> u32 {
        match self {
            ApbPrescaler::Div1 => 0b000,
            ApbPrescaler::Div2 => 0b100,
            ApbPrescaler::Div4 => 0b101,
            ApbPrescaler::Div8 => 0b110,
            ApbPrescaler::Div16 => 0b111,
        }
    }
}

/// PLL reference input
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PllSource {
    HsiDiv2,
    Hse,
    HseDiv2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllConfig {
    pub source: PllSource,
    /// 2..=16
    pub mul: u8,
}

/// Static description of the clock tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockConfig {
    /// External crystal frequency, if one is fitted and used.
    pub hse: Option<Hertz>,
    pub pll: Option<PllConfig>,
    pub sysclk: SysclkSource,
    pub ahb: AhbPrescaler,
    pub apb1: ApbPrescaler,
    pub apb2: ApbPrescaler,
    /// Number of status polls before an oscillator, the PLL or the
    /// system clock switch is declared dead.
    pub poll_budget: u32,
}

/// Frozen clock frequencies, the result of a validated `ClockConfig`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Clocks {
    pub sysclk: Hertz,
    pub hclk: Hertz,
    pub pclk1: Hertz,
    pub pclk2: Hertz,
    pub ppre1: u8,
    pub ppre2: u8,
    pub flash_wait_states: u8,
}

impl Clocks {
    pub const fn pclk(&self, domain: BusDomain) -> Hertz {
        match domain {
            BusDomain::Apb1 => self.pclk1,
            BusDomain::Apb2 => self.pclk2,
        }
    }

    /// Timer kernel clock for APB1 timers
    pub const fn timclk1(&self) -> Hertz {
        if self.ppre1 == 1 {
            self.pclk1
        } else {
            Hertz::from_raw(self.pclk1.raw() * 2)
        }
    }

    /// Timer kernel clock for APB2 timers
    pub const fn timclk2(&self) -> Hertz {
        if self.ppre2 == 1 {
            self.pclk2
        } else {
            Hertz::from_raw(self.pclk2.raw() * 2)
        }
    }
}

/// Flash latency needed to run from `sysclk`
pub const fn flash_wait_states(sysclk: Hertz) -> u8 {
    let hz = sysclk.raw();
    if hz <= 24_000_000 {
        0
    } else if hz <= 48_000_000 {
        1
    } else {
        2
    }
}

const fn in_range(f: Hertz, min: Hertz, max: Hertz) -> bool {
    f.raw() >= min.raw() && f.raw() <= max.raw()
}

impl ClockConfig {
    /// Validates the configuration against the documented limits and derives
    /// every bus frequency from it.
    ///
    /// Being `const`, this is evaluated at build time for the board
    /// descriptor.
    pub const fn freeze(&self) -> Result<Clocks, BringupError> {
        // zero polls would time out a healthy oscillator
        if self.poll_budget == 0 {
            return Err(BringupError::InvalidPollBudget);
        }
        if let Some(hse) = self.hse {
            if !in_range(hse, HSE_MIN, HSE_MAX) {
                return Err(BringupError::ClockOutOfRange(ClockDomain::Hse));
            }
        }

        let pll_output = match self.pll {
            Some(pll) => {
                let input = match (pll.source, self.hse) {
                    (PllSource::HsiDiv2, _) => HSI.raw() / 2,
                    (PllSource::Hse, Some(hse)) => hse.raw(),
                    (PllSource::HseDiv2, Some(hse)) => hse.raw() / 2,
                    (_, None) => return Err(BringupError::InvalidPll),
                };
                if pll.mul < 2 || pll.mul > 16 {
                    return Err(BringupError::InvalidPll);
                }
                if !in_range(Hertz::from_raw(input), PLL_INPUT_MIN, PLL_INPUT_MAX) {
                    return Err(BringupError::ClockOutOfRange(ClockDomain::PllInput));
                }
                let output = Hertz::from_raw(input * pll.mul as u32);
                if !in_range(output, PLL_OUTPUT_MIN, PLL_OUTPUT_MAX) {
                    return Err(BringupError::ClockOutOfRange(ClockDomain::PllOutput));
                }
                Some(output)
            }
            None => None,
        };

        let sysclk = match self.sysclk {
            SysclkSource::Hsi => HSI,
            SysclkSource::Hse => match self.hse {
                Some(hse) => hse,
                None => return Err(BringupError::ClockOutOfRange(ClockDomain::Hse)),
            },
            SysclkSource::Pll => match pll_output {
                Some(output) => output,
                None => return Err(BringupError::InvalidPll),
            },
        };
        if sysclk.raw() > SYSCLK_MAX.raw() {
            return Err(BringupError::ClockOutOfRange(ClockDomain::Sysclk));
        }

        let hclk = Hertz::from_raw(sysclk.raw() / self.ahb.divisor());
        if hclk.raw() > HCLK_MAX.raw() {
            return Err(BringupError::ClockOutOfRange(ClockDomain::Hclk));
        }
        let pclk1 = Hertz::from_raw(hclk.raw() / self.apb1.divisor());
        if pclk1.raw() > PCLK1_MAX.raw() {
            return Err(BringupError::ClockOutOfRange(ClockDomain::Pclk1));
        }
        let pclk2 = Hertz::from_raw(hclk.raw() / self.apb2.divisor());
        if pclk2.raw() > PCLK2_MAX.raw() {
            return Err(BringupError::ClockOutOfRange(ClockDomain::Pclk2));
        }

        Ok(Clocks {
            sysclk,
            hclk,
            pclk1,
            pclk2,
            ppre1: self.apb1.divisor() as u8,
            ppre2: self.apb2.divisor() as u8,
            flash_wait_states: flash_wait_states(sysclk),
        })
    }

    /// True when the external oscillator has to be running.
    pub const fn needs_hse(&self) -> bool {
        let pll_from_hse = match self.pll {
            Some(pll) => !matches!(pll.source, PllSource::HsiDiv2),
            None => false,
        };
        pll_from_hse || matches!(self.sysclk, SysclkSource::Hse)
    }
}


// - configure ----------------------------------------------------------------

fn wait_for(
    budget: u32,
    stage: ClockStage,
    mut ready: impl FnMut() -> bool,
) -> Result<(), BringupError> {
    for _ in 0..budget {
        if ready() {
            return Ok(());
        }
    }
    Err(BringupError::ClockLockTimeout(stage))
}

/// Programs the clock tree:
///
///   HSI as the temporary system clock
///   HSE start, bounded wait for ready
///   flash latency and bus prescalers
///   PLL parameters, bounded wait for lock
///   system clock switch, bounded wait for confirmation
///
/// The sequence is safe to repeat: the PLL is only reprogrammed while the
/// core runs from HSI.
pub fn configure<C: ClockControl>(rcc: &mut C, config: &ClockConfig) -> Result<Clocks, BringupError> {
    let clocks = config.freeze()?;
    let budget = config.poll_budget;

    rcc.start_oscillator(OscillatorKind::Hsi);
    wait_for(budget, ClockStage::OscillatorReady, || rcc.oscillator_ready(OscillatorKind::Hsi))?;
    rcc.select_sysclk(SysclkSource::Hsi);
    wait_for(budget, ClockStage::SysclkSwitch, || rcc.sysclk_source() == SysclkSource::Hsi)?;

    if config.needs_hse() {
        rcc.start_oscillator(OscillatorKind::Hse);
        wait_for(budget, ClockStage::OscillatorReady, || rcc.oscillator_ready(OscillatorKind::Hse))?;
    }

    // latency must be in place before the core speeds up
    rcc.set_flash_wait_states(clocks.flash_wait_states);
    rcc.set_prescalers(config.ahb, config.apb1, config.apb2);

    if let Some(pll) = &config.pll {
        rcc.stop_pll();
        rcc.configure_pll(pll);
        rcc.start_pll();
        wait_for(budget, ClockStage::PllLock, || rcc.pll_locked())?;
    }

    rcc.select_sysclk(config.sysclk);
    wait_for(budget, ClockStage::SysclkSwitch, || rcc.sysclk_source() == config.sysclk)?;

    log::debug!("clocks: sysclk={} hclk={} pclk1={} pclk2={}",
                clocks.sysclk.raw(), clocks.hclk.raw(), clocks.pclk1.raw(), clocks.pclk2.raw());

    Ok(clocks)
}


// - tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FakeHardware, Op};

    const HSE_72MHZ: ClockConfig = ClockConfig {
        hse: Some(Hertz::MHz(8)),
        pll: Some(PllConfig { source: PllSource::Hse, mul: 9 }),
        sysclk: SysclkSource::Pll,
        ahb: AhbPrescaler::Div1,
        apb1: ApbPrescaler::Div2,
        apb2: ApbPrescaler::Div1,
        poll_budget: 1_000,
    };

    #[test]
    fn freeze_72mhz_from_8mhz_crystal() {
        let clocks = HSE_72MHZ.freeze().unwrap();

        assert_eq!(clocks.sysclk.raw(), 72_000_000, "SYSCLK");
        assert_eq!(clocks.hclk.raw(),   72_000_000, "AHB");
        assert_eq!(clocks.pclk1.raw(),  36_000_000, "APB1");
        assert_eq!(clocks.ppre1,        2,          "APB1");
        assert_eq!(clocks.pclk2.raw(),  72_000_000, "APB2");
        assert_eq!(clocks.ppre2,        1,          "APB2");
        assert_eq!(clocks.timclk1().raw(), 72_000_000);
        assert_eq!(clocks.timclk2().raw(), 72_000_000);
        assert_eq!(clocks.flash_wait_states, 2);
    }

    #[test]
    fn freeze_rejects_fast_apb1() {
        let config = ClockConfig { apb1: ApbPrescaler::Div1, ..HSE_72MHZ };
        assert_eq!(config.freeze(), Err(BringupError::ClockOutOfRange(ClockDomain::Pclk1)));
    }

    #[test]
    fn freeze_rejects_overclocked_pll() {
        let config = ClockConfig {
            pll: Some(PllConfig { source: PllSource::Hse, mul: 10 }),
            ..HSE_72MHZ
        };
        assert_eq!(config.freeze(), Err(BringupError::ClockOutOfRange(ClockDomain::PllOutput)));
    }

    #[test]
    fn freeze_rejects_bad_multiplier_and_missing_crystal() {
        let config = ClockConfig {
            pll: Some(PllConfig { source: PllSource::Hse, mul: 17 }),
            ..HSE_72MHZ
        };
        assert_eq!(config.freeze(), Err(BringupError::InvalidPll));

        let config = ClockConfig { hse: None, ..HSE_72MHZ };
        assert_eq!(config.freeze(), Err(BringupError::InvalidPll));

        let config = ClockConfig { hse: Some(Hertz::MHz(25)), ..HSE_72MHZ };
        assert_eq!(config.freeze(), Err(BringupError::ClockOutOfRange(ClockDomain::Hse)));
    }

    #[test]
    fn freeze_rejects_empty_poll_budget() {
        let config = ClockConfig { poll_budget: 0, ..HSE_72MHZ };
        assert_eq!(config.freeze(), Err(BringupError::InvalidPollBudget));

        let mut hw = FakeHardware::new();
        assert_eq!(configure(&mut hw, &config), Err(BringupError::InvalidPollBudget));
        assert!(hw.ops().is_empty());

        let config = ClockConfig { poll_budget: 1, ..HSE_72MHZ };
        assert!(configure(&mut FakeHardware::new(), &config).is_ok());
    }

    #[test]
    fn freeze_hsi_only() {
        let config = ClockConfig {
            hse: None,
            pll: None,
            sysclk: SysclkSource::Hsi,
            apb1: ApbPrescaler::Div1,
            ..HSE_72MHZ
        };
        let clocks = config.freeze().unwrap();
        assert_eq!(clocks.sysclk, HSI);
        assert_eq!(clocks.pclk1, HSI);
        assert_eq!(clocks.flash_wait_states, 0);
        assert!(!config.needs_hse());
    }

    #[test]
    fn flash_latency_thresholds() {
        assert_eq!(flash_wait_states(Hertz::MHz(24)), 0);
        assert_eq!(flash_wait_states(Hertz::MHz(36)), 1);
        assert_eq!(flash_wait_states(Hertz::MHz(48)), 1);
        assert_eq!(flash_wait_states(Hertz::MHz(56)), 2);
    }

    #[test]
    fn configure_follows_clock_tree_order() {
        let mut hw = FakeHardware::new();
        let clocks = configure(&mut hw, &HSE_72MHZ).unwrap();
        assert_eq!(clocks, HSE_72MHZ.freeze().unwrap());

        let ops = hw.ops();
        let position = |op: &Op| ops.iter().position(|o| o == op).unwrap();

        let hse = position(&Op::StartOscillator(OscillatorKind::Hse));
        let latency = position(&Op::FlashWaitStates(2));
        let pll = position(&Op::ConfigurePll(PllConfig { source: PllSource::Hse, mul: 9 }));
        let start = position(&Op::StartPll);
        let switch = position(&Op::SelectSysclk(SysclkSource::Pll));

        assert!(hse < pll);
        assert!(latency < switch);
        assert!(pll < start);
        assert!(start < switch);
        assert_eq!(hw.sysclk_source(), SysclkSource::Pll);
    }

    #[test]
    fn configure_waits_for_slow_pll() {
        let mut hw = FakeHardware::new().pll_locks_after(50);
        assert!(configure(&mut hw, &HSE_72MHZ).is_ok());
    }

    #[test]
    fn configure_times_out_when_pll_never_locks() {
        let mut hw = FakeHardware::new().pll_never_locks();
        assert_eq!(configure(&mut hw, &HSE_72MHZ),
                   Err(BringupError::ClockLockTimeout(ClockStage::PllLock)));
        assert_ne!(hw.sysclk_source(), SysclkSource::Pll);
    }

    #[test]
    fn configure_times_out_without_crystal() {
        let mut hw = FakeHardware::new().hse_never_ready();
        assert_eq!(configure(&mut hw, &HSE_72MHZ),
                   Err(BringupError::ClockLockTimeout(ClockStage::OscillatorReady)));
        assert!(!hw.ops().contains(&Op::StartPll));
    }

    #[test]
    fn configure_rejects_invalid_config_before_touching_hardware() {
        let mut hw = FakeHardware::new();
        let config = ClockConfig { apb2: ApbPrescaler::Div1, apb1: ApbPrescaler::Div1, ..HSE_72MHZ };
        assert!(configure(&mut hw, &config).is_err());
        assert!(hw.ops().is_empty());
    }
}
