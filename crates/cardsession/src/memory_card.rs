use crate::apdu_card::CardInfo;
use carddriver::DriverClient;
use cardcore::{ApduResponse, DriverCommand, SessionError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SECTOR_COUNT: usize = 16;
pub const BLOCKS_PER_SECTOR: usize = 4;

/// Content stored in every block of a sector that failed to
/// authenticate or read.
pub const ERROR_MARKER: &str = "ERROR";

/// Delay between sector reads so the physical reader is not overwhelmed.
const INTER_SECTOR_DELAY: Duration = Duration::from_millis(50);

/// Card classification derived from the SAK byte during detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CardType {
    /// 16 sectors of 4 blocks (SAK 0x08).
    Classic1k,
    /// Larger classic memory card (SAK 0x18).
    Classic4k,
    /// Other secure memory card (SAK 0x20).
    SecureMemory,
    /// ISO 7816 card addressed with plain APDUs (SAK 0x00).
    #[default]
    GenericApdu,
    Unknown,
}

impl CardType {
    pub fn from_sak(sak: u8) -> Self {
        match sak {
            0x08 => Self::Classic1k,
            0x18 => Self::Classic4k,
            0x20 => Self::SecureMemory,
            0x00 => Self::GenericApdu,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sector {
    pub blocks: [String; BLOCKS_PER_SECTOR],
    pub authenticated: bool,
}

impl Default for Sector {
    fn default() -> Self {
        Self {
            blocks: Default::default(),
            authenticated: false,
        }
    }
}

/// Facade for contactless memory cards: detection, sector-keyed
/// authentication and block reads against a fixed 16x4 model.
pub struct MemoryCardSession {
    client: Arc<DriverClient>,
    timeout: Duration,
    sectors: Mutex<Vec<Sector>>,
    info: Mutex<CardInfo>,
}

impl MemoryCardSession {
    pub fn new(client: Arc<DriverClient>) -> Self {
        Self {
            client,
            timeout: crate::apdu_card::DEFAULT_TIMEOUT,
            sectors: Mutex::new(vec![Sector::default(); SECTOR_COUNT]),
            info: Mutex::new(CardInfo::default()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connect to the card and classify it from its anticollision bytes.
    ///
    /// ATR and UID are required reads (UID tolerates an `N/A` answer);
    /// SAK and ATS are best-effort and independently swallow failures.
    pub async fn detect(&self) -> Result<CardInfo, SessionError> {
        self.client
            .send_command(DriverCommand::ConnectCard, vec![], self.timeout)
            .await?;

        let atr = self
            .client
            .send_command(DriverCommand::GetAtr, vec![], self.timeout)
            .await?
            .first_data()
            .map(str::to_string);

        let uid = self
            .client
            .send_command(DriverCommand::GetUid, vec![], self.timeout)
            .await?
            .first_data()
            .filter(|u| !u.is_empty() && *u != "N/A")
            .map(str::to_string);

        let sak = match self
            .client
            .send_command(DriverCommand::GetSak, vec![], self.timeout)
            .await
        {
            Ok(msg) => msg
                .first_data()
                .and_then(|s| u8::from_str_radix(s, 16).ok()),
            Err(e) => {
                tracing::debug!(error = %e, "SAK not available");
                None
            }
        };

        let ats = match self
            .client
            .send_command(DriverCommand::GetAts, vec![], self.timeout)
            .await
        {
            Ok(msg) => msg.first_data().filter(|a| !a.is_empty()).map(str::to_string),
            Err(e) => {
                tracing::debug!(error = %e, "ATS not available");
                None
            }
        };

        let card_type = match sak {
            Some(sak) => CardType::from_sak(sak),
            None if ats.is_some() => CardType::GenericApdu,
            None if uid.is_some() => CardType::Classic1k,
            None => CardType::Unknown,
        };
        tracing::info!(?card_type, ?sak, "card detected");

        let info = CardInfo {
            atr,
            uid,
            sak,
            ats,
            card_type,
        };
        *self.info.lock().unwrap() = info.clone();
        Ok(info)
    }

    /// Authenticate and read each listed sector, invoking the progress
    /// callback after every sector whether it succeeded or not. The key
    /// is loaded into the reader once up front.
    pub async fn read_sectors(
        &self,
        sectors: &[u8],
        key: &str,
        mut on_progress: impl FnMut(u8, bool),
    ) -> Result<(), SessionError> {
        self.client
            .send_command(DriverCommand::LoadKey, vec![key.to_string()], self.timeout)
            .await?;

        for &sector in sectors {
            let ok = self.read_one_sector(sector).await;
            on_progress(sector, ok);
            tokio::time::sleep(INTER_SECTOR_DELAY).await;
        }
        Ok(())
    }

    /// Authenticate one sector and read its 4 blocks. Any failure marks
    /// the whole sector as an error record and reports false; the first
    /// failed block read aborts the remainder of the sector.
    async fn read_one_sector(&self, sector: u8) -> bool {
        let auth = self
            .client
            .send_command(
                DriverCommand::Authenticate,
                vec![format!("{sector:02X}")],
                self.timeout,
            )
            .await;
        if let Err(e) = auth {
            tracing::warn!(sector, error = %e, "sector authentication failed");
            self.mark_sector_error(sector);
            return false;
        }

        let mut blocks: [String; BLOCKS_PER_SECTOR] = Default::default();
        for i in 0..BLOCKS_PER_SECTOR {
            let block_no = sector as usize * BLOCKS_PER_SECTOR + i;
            let read = self
                .client
                .send_command(
                    DriverCommand::ReadBlock,
                    vec![format!("{block_no:02X}")],
                    self.timeout,
                )
                .await;
            let raw = match read {
                Ok(msg) => msg.first_data().unwrap_or_default().to_string(),
                Err(e) => {
                    tracing::warn!(sector, block_no, error = %e, "block read failed");
                    self.mark_sector_error(sector);
                    return false;
                }
            };
            // The transport call succeeding is not enough; the response
            // carries its own status word which must be 9000.
            match ApduResponse::parse(&raw) {
                Ok(resp) if resp.is_success() => blocks[i] = resp.data,
                Ok(resp) => {
                    tracing::warn!(sector, block_no, sw = %resp.status_word(), "block read rejected");
                    self.mark_sector_error(sector);
                    return false;
                }
                Err(e) => {
                    tracing::warn!(sector, block_no, error = %e, "block response undecodable");
                    self.mark_sector_error(sector);
                    return false;
                }
            }
        }

        let mut all = self.sectors.lock().unwrap();
        if let Some(slot) = all.get_mut(sector as usize) {
            slot.blocks = blocks;
            slot.authenticated = true;
        }
        true
    }

    fn mark_sector_error(&self, sector: u8) {
        let mut all = self.sectors.lock().unwrap();
        if let Some(slot) = all.get_mut(sector as usize) {
            slot.blocks = std::array::from_fn(|_| ERROR_MARKER.to_string());
            slot.authenticated = false;
        }
    }

    /// Write one block of an authenticated sector.
    pub async fn write_block(&self, block_no: u8, data: &str) -> Result<(), SessionError> {
        self.client
            .send_command(
                DriverCommand::WriteBlock,
                vec![format!("{block_no:02X}"), data.to_string()],
                self.timeout,
            )
            .await?;
        let mut all = self.sectors.lock().unwrap();
        let (sector, idx) = (
            block_no as usize / BLOCKS_PER_SECTOR,
            block_no as usize % BLOCKS_PER_SECTOR,
        );
        if let Some(slot) = all.get_mut(sector) {
            slot.blocks[idx] = data.to_string();
        }
        Ok(())
    }

    /// Disconnect and blank the retained sector model.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.client
            .send_command(DriverCommand::Halt, vec![], self.timeout)
            .await
            .ok();
        self.client
            .send_command(DriverCommand::DisconnectCard, vec![], self.timeout)
            .await?;
        *self.sectors.lock().unwrap() = vec![Sector::default(); SECTOR_COUNT];
        *self.info.lock().unwrap() = CardInfo::default();
        Ok(())
    }

    /// Snapshot of the sector model.
    pub fn sectors(&self) -> Vec<Sector> {
        self.sectors.lock().unwrap().clone()
    }

    pub fn card_info(&self) -> CardInfo {
        self.info.lock().unwrap().clone()
    }
}
